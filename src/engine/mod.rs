//! Chain execution engine
//!
//! This module contains:
//! - `executor` - The chain executor
//! - `step_runner` - Condition, attempts, retries and extraction for one step
//! - `interrupt` - Chain timeout and cancellation
//! - `result` - Step and chain result types and their state machines
//! - `recorder` - Execution recorders
//! - `error` - Executor error types
//! - `directory_runner` - Run every chain in a directory

pub mod directory_runner;
pub mod error;
pub mod executor;
pub mod interrupt;
pub mod recorder;
pub mod result;
pub mod step_runner;

pub use directory_runner::{
    run_chain_directory, ChainDirectoryRunner, ChainFailure, DirectoryResult, DirectoryRunError,
};
pub use error::ChainError;
pub use executor::ChainExecutor;
pub use interrupt::{InterruptReason, RunInterrupt};
pub use recorder::{ExecutionRecorder, JsonDirRecorder, MemoryRecorder, NullRecorder, RecordError};
pub use result::{
    AttemptRecord, ChainCounts, ChainExecutionResult, ChainStatus, ErrorKind, ExtractionOmission,
    ResponseRecord, SkipReason, StepError, StepExecutionResult, StepStatus,
};
pub use step_runner::StepRunner;
