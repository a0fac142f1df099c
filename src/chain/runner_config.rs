//! Runner configuration
//!
//! Loaded from `runner.yaml` next to the chain files:
//!
//! ```yaml
//! parallel: 4
//!
//! http:
//!   user_agent: chain-runner/0.1
//!   follow_redirects: true
//!   headers:
//!     X-Env: staging
//!   auth:
//!     type: bearer
//!     token: abc123
//!
//! limits:
//!   max_steps: 20
//!   max_retry_count: 5
//!   max_step_timeout: 60000
//!
//! recorder:
//!   type: json_dir
//!   path: .chain-runner/runs
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::loader::LoadError;

/// Settings for the shared HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// User-Agent header sent with every request
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Default headers included in all requests; step headers win on conflict
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Authentication applied to every request
    #[serde(default)]
    pub auth: Option<HttpAuthConfig>,

    /// Whether to follow redirects (default: true)
    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    /// Whether to validate TLS certificates (default: true)
    #[serde(default = "default_true")]
    pub validate_ssl: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            headers: BTreeMap::new(),
            auth: None,
            follow_redirects: true,
            validate_ssl: true,
        }
    }
}

/// Static credentials for outbound requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HttpAuthConfig {
    Bearer { token: String },
    Basic { username: String, password: String },
    ApiKey { header: String, key: String },
}

/// Read-only plan limits enforced before a run starts
///
/// Absent limits are not enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Maximum number of steps in one chain
    #[serde(default)]
    pub max_steps: Option<usize>,

    /// Maximum `retry_count` for any step
    #[serde(default)]
    pub max_retry_count: Option<u32>,

    /// Maximum per-attempt step timeout in milliseconds
    #[serde(default)]
    pub max_step_timeout: Option<u64>,

    /// Maximum chain timeout in milliseconds
    #[serde(default)]
    pub max_chain_timeout: Option<u64>,
}

/// Where finished runs are recorded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecorderConfig {
    #[default]
    Memory,
    #[serde(rename = "none")]
    Disabled,
    JsonDir {
        #[serde(default = "default_runs_dir")]
        path: String,
    },
}

fn default_runs_dir() -> String {
    ".chain-runner/runs".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum number of chains running at once
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    #[serde(default)]
    pub http: HttpClientConfig,

    #[serde(default)]
    pub limits: PlanLimits,

    #[serde(default)]
    pub recorder: RecorderConfig,
}

fn default_parallel() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            http: HttpClientConfig::default(),
            limits: PlanLimits::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: RunnerConfig =
            serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
                file: path.display().to_string(),
                error: e,
            })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.parallel, 4);
        assert!(config.http.follow_redirects);
        assert!(config.http.validate_ssl);
        assert_eq!(config.limits, PlanLimits::default());
        assert_eq!(config.recorder, RecorderConfig::Memory);
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
parallel: 8
http:
  user_agent: test-agent
  validate_ssl: false
  auth:
    type: api_key
    header: X-Api-Key
    key: k-1
limits:
  max_steps: 10
  max_retry_count: 3
recorder:
  type: json_dir
"#;
        let config: RunnerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.parallel, 8);
        assert_eq!(config.http.user_agent.as_deref(), Some("test-agent"));
        assert!(!config.http.validate_ssl);
        assert!(config.http.follow_redirects);
        assert!(matches!(
            config.http.auth,
            Some(HttpAuthConfig::ApiKey { ref header, .. }) if header == "X-Api-Key"
        ));
        assert_eq!(config.limits.max_steps, Some(10));
        assert_eq!(config.limits.max_retry_count, Some(3));
        assert_eq!(config.limits.max_step_timeout, None);
        assert_eq!(
            config.recorder,
            RecorderConfig::JsonDir {
                path: ".chain-runner/runs".to_string()
            }
        );
    }

    #[test]
    fn test_recorder_none() {
        let config: RunnerConfig = serde_yaml::from_str("recorder:\n  type: none\n").unwrap();
        assert_eq!(config.recorder, RecorderConfig::Disabled);
    }
}
