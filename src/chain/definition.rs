//! Chain and step definitions
//!
//! These are the user-authored inputs to a run. The engine never mutates them;
//! a run works from a validated copy (see [`super::validate`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Chain
// ============================================================================

/// A complete chain definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDefinition {
    /// Chain name (required)
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,

    /// Stop the run when a step fails, unless that step allows continuing
    #[serde(default = "default_true")]
    pub stop_on_failure: bool,

    /// Timeout for the entire run in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Steps, executed in ascending `order`
    pub steps: Vec<StepDefinition>,
}

impl ChainDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            name: name.into(),
            description: None,
            stop_on_failure: true,
            timeout: None,
            steps,
        }
    }
}

// ============================================================================
// Step
// ============================================================================

/// HTTP methods a step may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request body template
///
/// Text bodies are interpolated as-is. Structured bodies keep their JSON
/// shape; a string leaf consisting of a single `{{placeholder}}` is replaced
/// by the variable's JSON value rather than its string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodyTemplate {
    Text(String),
    Json(Value),
}

/// How to pull one variable out of a step's response
///
/// Accepts either a bare source string or the full form:
///
/// ```yaml
/// extract:
///   user_id: body.data.id
///   token:
///     from: headers.x-auth-token
///     required: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractRule {
    /// Source expression: `status`, `headers.<name>`, `body` or `body.<path>`
    pub from: String,

    /// Fail the step with an extraction error if the source cannot be resolved
    pub required: bool,

    /// Value stored when the source cannot be resolved
    pub default: Option<Value>,
}

impl ExtractRule {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            required: false,
            default: None,
        }
    }
}

impl<'de> Deserialize<'de> for ExtractRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ExtractRuleHelper {
            Source(String),
            Full {
                from: String,
                #[serde(default)]
                required: bool,
                #[serde(default)]
                default: Option<Value>,
            },
        }

        match ExtractRuleHelper::deserialize(deserializer)? {
            ExtractRuleHelper::Source(from) => Ok(ExtractRule::new(from)),
            ExtractRuleHelper::Full {
                from,
                required,
                default,
            } => Ok(ExtractRule {
                from,
                required,
                default,
            }),
        }
    }
}

/// One step's request template plus its policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Position in the chain; unique within a chain
    pub order: u32,

    /// Step name (for logging and results)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub method: HttpMethod,

    /// URL template
    pub url: String,

    /// Header templates, one value per header
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Query parameter templates, appended to the URL
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<BodyTemplate>,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_step_timeout")]
    pub timeout: u64,

    /// Retries after the first attempt
    #[serde(default)]
    pub retry_count: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Let the chain proceed past this step's failure
    #[serde(default)]
    pub continue_on_failure: bool,

    /// Pre-condition gating the step
    #[serde(default, alias = "if")]
    pub condition: Option<String>,

    /// Variables to capture from the response
    #[serde(default, alias = "extract_variables")]
    pub extract: BTreeMap<String, ExtractRule>,

    /// Accepted status codes; any 2xx when absent
    #[serde(default)]
    pub success_status: Option<Vec<u16>>,

    #[serde(default = "default_true", alias = "enabled")]
    pub is_enabled: bool,
}

impl StepDefinition {
    pub fn new(order: u32, method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            order,
            name: None,
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            body: None,
            timeout: default_step_timeout(),
            retry_count: 0,
            retry_delay: default_retry_delay(),
            continue_on_failure: false,
            condition: None,
            extract: BTreeMap::new(),
            success_status: None,
            is_enabled: true,
        }
    }

    /// Name used in logs and results
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Step {}", self.order))
    }

    /// Whether `status` satisfies this step's success criterion
    pub fn accepts_status(&self, status: u16) -> bool {
        match &self.success_status {
            Some(codes) => codes.contains(&status),
            None => (200..300).contains(&status),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_step_timeout() -> u64 {
    30_000
}

fn default_retry_delay() -> u64 {
    1000
}
