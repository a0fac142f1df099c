//! # Chain Runner
//!
//! An execution engine for chains of templated HTTP requests. A chain is an
//! ordered list of steps; each step sends one request, may be guarded by a
//! condition, retries on failure and extracts variables from its response for
//! later steps to use through `{{ }}` placeholders.
//!
//! ## Features
//!
//! - **Declarative YAML chains** - Steps, headers, bodies and extraction rules
//! - **Variable passing** - `{{user_id}}` and `{{user.address.city}}` references
//! - **Conditions** - `{{role}} == 'admin' && $prev.status_code == 200`
//! - **Retries** - Fixed delay, bounded attempts, per-step timeouts
//! - **Chain timeout and cancellation** - Interrupts in-flight requests
//! - **Recording** - Every run is handed to an append-only recorder
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chain_runner::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let chain_yaml = r#"
//! name: create-order
//! steps:
//!   - order: 1
//!     name: Login
//!     method: POST
//!     url: https://api.example.com/login
//!     body: { "user": "demo" }
//!     extract:
//!       token: body.token
//!   - order: 2
//!     name: Create order
//!     method: POST
//!     url: https://api.example.com/orders
//!     headers:
//!       Authorization: "Bearer {{token}}"
//! "#;
//!
//!     let executor = ChainExecutor::from_config(&RunnerConfig::default())?;
//!     let result = executor.run_yaml(chain_yaml).await?;
//!
//!     println!("Chain finished: {}", result.status.as_str());
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod chain;
pub mod engine;

// Re-export main types
pub use bridge::{HttpExecutor, HttpResponse, ReqwestExecutor, TransportError};
pub use chain::{
    evaluate_condition, materialize, prepare, BodyTemplate, ChainDefinition, ChainLoader,
    ConcreteRequest, ConditionOutcome, ConfigError, ExtractRule, HttpAuthConfig, HttpClientConfig,
    HttpMethod, LoadError, PlanLimits, PreparedChain, RecorderConfig, RunnerConfig,
    StepDefinition, VariableStore,
};
pub use engine::{
    run_chain_directory, ChainDirectoryRunner, ChainError, ChainExecutionResult, ChainExecutor,
    ChainStatus, DirectoryResult, DirectoryRunError, ErrorKind, ExecutionRecorder,
    JsonDirRecorder, MemoryRecorder, NullRecorder, StepExecutionResult, StepStatus,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{HttpExecutor, HttpResponse, ReqwestExecutor, TransportError};
    pub use crate::chain::{
        prepare, ChainDefinition, ChainLoader, HttpMethod, LoadError, PlanLimits, RunnerConfig,
        StepDefinition, VariableStore,
    };
    pub use crate::engine::{
        run_chain_directory, ChainDirectoryRunner, ChainError, ChainExecutionResult,
        ChainExecutor, ChainStatus, DirectoryResult, ExecutionRecorder, MemoryRecorder,
        SkipReason, StepExecutionResult, StepStatus,
    };
}
