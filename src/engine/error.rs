//! Executor error types

use crate::bridge::TransportError;
use crate::chain::{ConfigError, LoadError};

use super::recorder::RecordError;

/// Errors that prevent a run from starting
///
/// Step failures are never errors; they are reported in the run result.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] TransportError),

    #[error("Recorder setup failed: {0}")]
    Recorder(#[from] RecordError),
}
