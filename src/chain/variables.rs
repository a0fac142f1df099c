//! Per-run variable store
//!
//! Variables are captured from step responses and read by later steps'
//! templates and conditions. A store belongs to exactly one run.

use serde_json::Value;
use std::collections::BTreeMap;

/// Variables captured during a single run
///
/// Entries are only ever added or overwritten, never removed.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    values: BTreeMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, overwriting any previous value
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Look up a variable and walk `path` into its JSON value
    pub fn lookup(&self, name: &str, path: &[String]) -> Option<&Value> {
        resolve_path(self.values.get(name)?, path)
    }

    /// Merge captured variables (overwrite on collision)
    pub fn merge(&mut self, captured: &BTreeMap<String, Value>) {
        for (name, value) in captured {
            self.values.insert(name.clone(), value.clone());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Immutable copy of the current contents
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }
}

/// Walk a dotted path into a JSON value
///
/// Numeric segments index into arrays; every other segment is an object key.
pub fn resolve_path<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Render a value for interpolation into text
///
/// Strings are used verbatim, numbers use their JSON form, null renders as
/// an empty string and structured values as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
