//! Chain types and the pure pieces of a run
//!
//! - `definition` - ChainDefinition, StepDefinition and their YAML form
//! - `variables` - the per-run VariableStore
//! - `template` - `{{ }}` template AST and request materialization
//! - `condition` - step pre-condition parsing and evaluation
//! - `extract` - pulling variables out of responses
//! - `validate` - structural checks that turn a definition into a PreparedChain
//! - `loader` - load chains from files and directories
//! - `runner_config` - runner.yaml configuration

pub mod condition;
pub mod definition;
pub mod extract;
pub mod loader;
pub mod runner_config;
pub mod template;
pub mod validate;
pub mod variables;

pub use condition::{
    evaluate_condition, ConditionOutcome, ConditionParseError, EvalError, Expression, PreviousStep,
};
pub use definition::{BodyTemplate, ChainDefinition, ExtractRule, HttpMethod, StepDefinition};
pub use extract::{ExtractError, ExtractSource};
pub use loader::{ChainLoader, LoadError};
pub use runner_config::{HttpAuthConfig, HttpClientConfig, PlanLimits, RecorderConfig, RunnerConfig};
pub use template::{materialize, ConcreteRequest, RequestTemplate, Template};
pub use validate::{prepare, ConfigError, PreparedChain, PreparedStep};
pub use variables::VariableStore;
