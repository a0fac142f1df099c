//! Structural validation
//!
//! Turns a [`ChainDefinition`] into a [`PreparedChain`]: steps sorted by
//! `order`, conditions parsed, extraction sources parsed and request templates
//! compiled. Anything wrong here is a configuration error and the run never
//! starts.

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use std::sync::LazyLock;

use super::condition::{ConditionParseError, Expression};
use super::definition::{ChainDefinition, ExtractRule, StepDefinition};
use super::extract::{ExtractSource, ExtractSourceError};
use super::runner_config::PlanLimits;
use super::template::RequestTemplate;

static VARIABLE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").unwrap());

/// Chain definitions the engine refuses to run
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Duplicate step order {0}")]
    DuplicateStepOrder(u32),

    #[error("Step {order}: malformed condition '{condition}': {error}")]
    InvalidCondition {
        order: u32,
        condition: String,
        #[source]
        error: ConditionParseError,
    },

    #[error("Step {order}: variable '{variable}': {error}")]
    InvalidExtractRule {
        order: u32,
        variable: String,
        #[source]
        error: ExtractSourceError,
    },

    #[error("Step {order}: invalid variable name '{name}'")]
    InvalidVariableName { order: u32, name: String },

    #[error("Step {0}: URL template is empty")]
    EmptyUrl(u32),

    #[error("Plan limit exceeded: {0}")]
    LimitExceeded(String),
}

/// One extraction rule with its parsed source
#[derive(Debug, Clone)]
pub struct PreparedExtract {
    pub variable: String,
    pub rule: ExtractRule,
    pub source: ExtractSource,
}

/// A step ready to run
#[derive(Debug, Clone)]
pub struct PreparedStep {
    pub definition: StepDefinition,
    pub request: RequestTemplate,
    pub condition: Option<Expression>,
    pub extract: Vec<PreparedExtract>,
}

impl PreparedStep {
    pub fn order(&self) -> u32 {
        self.definition.order
    }

    pub fn name(&self) -> String {
        self.definition.display_name()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.definition.timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.definition.retry_delay)
    }
}

/// A validated chain, steps in ascending order
#[derive(Debug, Clone)]
pub struct PreparedChain {
    pub name: String,
    pub stop_on_failure: bool,
    pub timeout: Option<Duration>,
    pub steps: Vec<PreparedStep>,
}

/// Validate a chain against its structural invariants and the plan limits
pub fn prepare(chain: &ChainDefinition, limits: &PlanLimits) -> Result<PreparedChain, ConfigError> {
    check_limits(chain, limits)?;

    let mut seen = HashSet::new();
    for step in &chain.steps {
        if !seen.insert(step.order) {
            return Err(ConfigError::DuplicateStepOrder(step.order));
        }
    }

    let mut steps = chain
        .steps
        .iter()
        .map(prepare_step)
        .collect::<Result<Vec<_>, _>>()?;
    steps.sort_by_key(|s| s.order());

    Ok(PreparedChain {
        name: chain.name.clone(),
        stop_on_failure: chain.stop_on_failure,
        timeout: chain.timeout.map(Duration::from_millis),
        steps,
    })
}

fn prepare_step(step: &StepDefinition) -> Result<PreparedStep, ConfigError> {
    if step.url.trim().is_empty() {
        return Err(ConfigError::EmptyUrl(step.order));
    }

    let condition = step
        .condition
        .as_deref()
        .map(|c| {
            Expression::parse(c).map_err(|error| ConfigError::InvalidCondition {
                order: step.order,
                condition: c.to_string(),
                error,
            })
        })
        .transpose()?;

    let extract = step
        .extract
        .iter()
        .map(|(variable, rule)| {
            if !VARIABLE_NAME_REGEX.is_match(variable) {
                return Err(ConfigError::InvalidVariableName {
                    order: step.order,
                    name: variable.clone(),
                });
            }
            let source =
                ExtractSource::parse(&rule.from).map_err(|error| ConfigError::InvalidExtractRule {
                    order: step.order,
                    variable: variable.clone(),
                    error,
                })?;
            Ok(PreparedExtract {
                variable: variable.clone(),
                rule: rule.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PreparedStep {
        definition: step.clone(),
        request: RequestTemplate::compile(step),
        condition,
        extract,
    })
}

fn check_limits(chain: &ChainDefinition, limits: &PlanLimits) -> Result<(), ConfigError> {
    if let Some(max) = limits.max_steps {
        if chain.steps.len() > max {
            return Err(ConfigError::LimitExceeded(format!(
                "chain has {} steps, plan allows {}",
                chain.steps.len(),
                max
            )));
        }
    }

    if let (Some(max), Some(timeout)) = (limits.max_chain_timeout, chain.timeout) {
        if timeout > max {
            return Err(ConfigError::LimitExceeded(format!(
                "chain timeout {}ms exceeds {}ms",
                timeout, max
            )));
        }
    }

    for step in &chain.steps {
        if let Some(max) = limits.max_retry_count {
            if step.retry_count > max {
                return Err(ConfigError::LimitExceeded(format!(
                    "step {} retry_count {} exceeds {}",
                    step.order, step.retry_count, max
                )));
            }
        }
        if let Some(max) = limits.max_step_timeout {
            if step.timeout > max {
                return Err(ConfigError::LimitExceeded(format!(
                    "step {} timeout {}ms exceeds {}ms",
                    step.order, step.timeout, max
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::HttpMethod;

    fn step(order: u32) -> StepDefinition {
        StepDefinition::new(order, HttpMethod::Get, "https://example.com")
    }

    #[test]
    fn test_prepare_sorts_steps() {
        let chain = ChainDefinition::new("c", vec![step(3), step(1), step(2)]);
        let prepared = prepare(&chain, &PlanLimits::default()).unwrap();
        let orders: Vec<_> = prepared.steps.iter().map(|s| s.order()).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(prepared.stop_on_failure);
        assert_eq!(prepared.timeout, None);
    }

    #[test]
    fn test_duplicate_order_rejected() {
        let chain = ChainDefinition::new("c", vec![step(1), step(2), step(1)]);
        let err = prepare(&chain, &PlanLimits::default()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStepOrder(1)));
    }

    #[test]
    fn test_malformed_condition_rejected() {
        let mut s = step(1);
        s.condition = Some("{{status}} ==".to_string());
        let err = prepare(&ChainDefinition::new("c", vec![s]), &PlanLimits::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCondition { order: 1, .. }));
    }

    #[test]
    fn test_deeply_nested_condition_rejected() {
        let mut s = step(1);
        s.condition = Some(format!("{}true{}", "(".repeat(50_000), ")".repeat(50_000)));
        let err = prepare(&ChainDefinition::new("c", vec![s]), &PlanLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidCondition {
                order: 1,
                error: ConditionParseError::TooDeep(_),
                ..
            }
        ));
    }

    #[test]
    fn test_bad_extract_rules_rejected() {
        let mut s = step(1);
        s.extract
            .insert("id".to_string(), ExtractRule::new("cookies.id"));
        let err = prepare(&ChainDefinition::new("c", vec![s]), &PlanLimits::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidExtractRule { .. }));

        let mut s = step(1);
        s.extract
            .insert("user id".to_string(), ExtractRule::new("body.id"));
        let err = prepare(&ChainDefinition::new("c", vec![s]), &PlanLimits::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVariableName { .. }));
    }

    #[test]
    fn test_empty_url_rejected() {
        let s = StepDefinition::new(4, HttpMethod::Get, "  ");
        let err = prepare(&ChainDefinition::new("c", vec![s]), &PlanLimits::default()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyUrl(4)));
    }

    #[test]
    fn test_plan_limits() {
        let limits = PlanLimits {
            max_steps: Some(2),
            max_retry_count: Some(1),
            max_step_timeout: Some(5000),
            max_chain_timeout: Some(60_000),
        };

        let chain = ChainDefinition::new("c", vec![step(1), step(2), step(3)]);
        assert!(matches!(
            prepare(&chain, &limits),
            Err(ConfigError::LimitExceeded(_))
        ));

        let mut s = step(1);
        s.retry_count = 2;
        assert!(prepare(&ChainDefinition::new("c", vec![s]), &limits).is_err());

        let s = step(1);
        assert!(prepare(&ChainDefinition::new("c", vec![s]), &limits).is_err());

        let mut s = step(1);
        s.timeout = 5000;
        let mut chain = ChainDefinition::new("c", vec![s]);
        chain.timeout = Some(120_000);
        assert!(prepare(&chain, &limits).is_err());

        chain.timeout = Some(60_000);
        assert!(prepare(&chain, &limits).is_ok());
    }
}
