//! Request templates and materialization
//!
//! Step fields may contain `{{name}}` or `{{name.path.into.json}}`
//! placeholders. Templates are parsed once into a small AST and rendered
//! against a [`VariableStore`] by a single interpreter pass:
//!
//! - A placeholder whose variable (or path) is missing renders as an empty
//!   string and is reported in [`ConcreteRequest::unresolved`].
//! - Values are stringified with [`stringify`], which never depends on locale.
//! - Inside structured JSON bodies, a string that is exactly one placeholder
//!   is replaced by the variable's JSON value, keeping its type.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::definition::{BodyTemplate, HttpMethod, StepDefinition};
use super::variables::{stringify, VariableStore};

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").unwrap());

static REFERENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+(\.[A-Za-z0-9_\-]+)*$").unwrap());

/// A variable reference: `name` followed by an optional JSON path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub path: Vec<String>,
}

impl Placeholder {
    /// Parse the text between `{{` and `}}`
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if !REFERENCE_REGEX.is_match(reference) {
            return None;
        }
        let mut parts = reference.split('.').map(String::from);
        let name = parts.next()?;
        Some(Self {
            name,
            path: parts.collect(),
        })
    }

    pub fn resolve<'a>(&self, store: &'a VariableStore) -> Option<&'a Value> {
        store.lookup(&self.name, &self.path)
    }

    /// The reference as written, without braces
    pub fn reference(&self) -> String {
        std::iter::once(self.name.as_str())
            .chain(self.path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A parsed text template
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string
    ///
    /// Anything that does not form a valid `{{reference}}` is kept as literal
    /// text, so parsing never fails.
    pub fn parse(input: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;

        for cap in PLACEHOLDER_REGEX.captures_iter(input) {
            let whole = cap.get(0).unwrap();
            let Some(placeholder) = Placeholder::parse(&cap[1]) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(input[last..whole.start()].to_string()));
            }
            segments.push(Segment::Placeholder(placeholder));
            last = whole.end();
        }

        if last < input.len() {
            segments.push(Segment::Literal(input[last..].to_string()));
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    /// The placeholder if the template is nothing but one placeholder
    pub fn as_single_placeholder(&self) -> Option<&Placeholder> {
        match self.segments.as_slice() {
            [Segment::Placeholder(p)] => Some(p),
            _ => None,
        }
    }
}

/// A structured JSON body with templated string leaves
#[derive(Debug, Clone, PartialEq)]
pub enum JsonTemplate {
    Literal(Value),
    Text(Template),
    Array(Vec<JsonTemplate>),
    Object(Vec<(String, JsonTemplate)>),
}

impl JsonTemplate {
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::String(s) => JsonTemplate::Text(Template::parse(s)),
            Value::Array(items) => JsonTemplate::Array(items.iter().map(Self::parse).collect()),
            Value::Object(map) => JsonTemplate::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::parse(v)))
                    .collect(),
            ),
            other => JsonTemplate::Literal(other.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyAst {
    Text(Template),
    Json(JsonTemplate),
}

/// A fully resolved outbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcreteRequest {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Placeholders that could not be resolved, in first-seen order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

/// A step's request, compiled into template ASTs
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    method: HttpMethod,
    url: Template,
    headers: BTreeMap<String, Template>,
    query: BTreeMap<String, Template>,
    body: Option<BodyAst>,
}

impl RequestTemplate {
    pub fn compile(step: &StepDefinition) -> Self {
        let compile_map = |map: &BTreeMap<String, String>| {
            map.iter()
                .map(|(k, v)| (k.clone(), Template::parse(v)))
                .collect()
        };

        Self {
            method: step.method,
            url: Template::parse(&step.url),
            headers: compile_map(&step.headers),
            query: compile_map(&step.query),
            body: step.body.as_ref().map(|body| match body {
                BodyTemplate::Text(text) => BodyAst::Text(Template::parse(text)),
                BodyTemplate::Json(value) => BodyAst::Json(JsonTemplate::parse(value)),
            }),
        }
    }

    /// Resolve every template against `store`
    pub fn materialize(&self, store: &VariableStore) -> ConcreteRequest {
        let mut renderer = Renderer::new(store);

        let url = renderer.text(&self.url);
        let query = self
            .query
            .iter()
            .map(|(k, t)| (k.clone(), renderer.text(t)))
            .collect();
        let mut headers: BTreeMap<String, String> = self
            .headers
            .iter()
            .map(|(k, t)| (k.clone(), renderer.text(t)))
            .collect();

        let body = match &self.body {
            Some(BodyAst::Text(template)) => Some(renderer.text(template)),
            Some(BodyAst::Json(template)) => {
                let has_content_type = headers
                    .keys()
                    .any(|k| k.eq_ignore_ascii_case("content-type"));
                if !has_content_type {
                    headers.insert("Content-Type".to_string(), "application/json".to_string());
                }
                Some(renderer.json(template).to_string())
            }
            None => None,
        };

        ConcreteRequest {
            method: self.method,
            url,
            query,
            headers,
            body,
            unresolved: renderer.unresolved,
        }
    }
}

/// Compile and materialize a step in one go
pub fn materialize(step: &StepDefinition, store: &VariableStore) -> ConcreteRequest {
    RequestTemplate::compile(step).materialize(store)
}

/// Render a single text template, ignoring unresolved placeholders
pub fn render(input: &str, store: &VariableStore) -> String {
    Renderer::new(store).text(&Template::parse(input))
}

struct Renderer<'a> {
    store: &'a VariableStore,
    unresolved: Vec<String>,
}

impl<'a> Renderer<'a> {
    fn new(store: &'a VariableStore) -> Self {
        Self {
            store,
            unresolved: Vec::new(),
        }
    }

    fn resolve(&mut self, placeholder: &Placeholder) -> Option<&'a Value> {
        let value = placeholder.resolve(self.store);
        if value.is_none() {
            let reference = placeholder.reference();
            if !self.unresolved.contains(&reference) {
                self.unresolved.push(reference);
            }
        }
        value
    }

    fn text(&mut self, template: &Template) -> String {
        let mut out = String::new();
        for segment in template.segments() {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(p) => {
                    if let Some(value) = self.resolve(p) {
                        out.push_str(&stringify(value));
                    }
                }
            }
        }
        out
    }

    fn json(&mut self, template: &JsonTemplate) -> Value {
        match template {
            JsonTemplate::Literal(value) => value.clone(),
            JsonTemplate::Text(text) => match text.as_single_placeholder() {
                Some(p) => self
                    .resolve(p)
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new())),
                None => Value::String(self.text(text)),
            },
            JsonTemplate::Array(items) => {
                Value::Array(items.iter().map(|item| self.json(item)).collect())
            }
            JsonTemplate::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.json(v)))
                    .collect(),
            ),
        }
    }
}
