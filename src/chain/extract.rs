//! Variable extraction from step responses
//!
//! Source expressions:
//! - `status` - the response status code
//! - `headers.<name>` - a response header (case-insensitive)
//! - `body` - the whole body, as JSON when it parses, otherwise as text
//! - `body.<path>` or `$.<path>` - a value inside a JSON body; array indices
//!   may be written `items.0.id` or `items[0].id`

use serde_json::Value;

use super::variables::resolve_path;
use crate::bridge::HttpResponse;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid extraction source '{input}': {reason}")]
pub struct ExtractSourceError {
    pub input: String,
    pub reason: String,
}

/// Why a source could not be resolved against a response
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("header '{0}' not present")]
    MissingHeader(String),

    #[error("body is not valid JSON")]
    BodyNotJson,

    #[error("path '{0}' not found in body")]
    PathNotFound(String),
}

/// A parsed extraction source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractSource {
    Status,
    Header(String),
    Body,
    BodyPath(Vec<String>),
}

impl ExtractSource {
    pub fn parse(source: &str) -> Result<Self, ExtractSourceError> {
        let invalid = |reason: &str| ExtractSourceError {
            input: source.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = source.trim();

        if trimmed == "status" || trimmed == "status_code" {
            return Ok(ExtractSource::Status);
        }
        if trimmed == "body" || trimmed == "$" {
            return Ok(ExtractSource::Body);
        }
        if let Some(name) = trimmed.strip_prefix("headers.") {
            if name.is_empty() {
                return Err(invalid("missing header name"));
            }
            return Ok(ExtractSource::Header(name.to_string()));
        }

        let path = trimmed
            .strip_prefix("body.")
            .or_else(|| trimmed.strip_prefix("$."))
            .ok_or_else(|| invalid("expected status, headers.<name>, body or body.<path>"))?;

        let segments: Vec<String> = path
            .replace('[', ".")
            .replace(']', "")
            .split('.')
            .map(String::from)
            .collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid("empty path segment"));
        }
        Ok(ExtractSource::BodyPath(segments))
    }

    /// Resolve this source against a response
    pub fn extract(&self, response: &HttpResponse) -> Result<Value, ExtractError> {
        match self {
            ExtractSource::Status => Ok(Value::from(response.status)),
            ExtractSource::Header(name) => response
                .header(name)
                .map(|v| Value::String(v.to_string()))
                .ok_or_else(|| ExtractError::MissingHeader(name.clone())),
            ExtractSource::Body => Ok(response
                .json()
                .unwrap_or_else(|| Value::String(response.body.clone()))),
            ExtractSource::BodyPath(path) => {
                let body = response.json().ok_or(ExtractError::BodyNotJson)?;
                resolve_path(&body, path)
                    .cloned()
                    .ok_or_else(|| ExtractError::PathNotFound(path.join(".")))
            }
        }
    }
}
