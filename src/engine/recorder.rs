//! Execution recorders
//!
//! The executor hands every finished run to exactly one recorder, once.
//! Persisted runs are append-only: a recorder never rewrites a run it has
//! already stored.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

use super::result::ChainExecutionResult;
use crate::chain::RecorderConfig;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Run {0} already recorded")]
    AlreadyRecorded(String),
}

#[async_trait]
pub trait ExecutionRecorder: Send + Sync {
    async fn save(&self, result: &ChainExecutionResult) -> Result<(), RecordError>;
}

/// Build the recorder described by `runner.yaml`
pub fn from_config(config: &RecorderConfig) -> Result<Arc<dyn ExecutionRecorder>, RecordError> {
    let recorder: Arc<dyn ExecutionRecorder> = match config {
        RecorderConfig::Memory => Arc::new(MemoryRecorder::new()),
        RecorderConfig::Disabled => Arc::new(NullRecorder),
        RecorderConfig::JsonDir { path } => Arc::new(JsonDirRecorder::new(path)?),
    };
    Ok(recorder)
}

/// Keeps results in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    runs: RwLock<Vec<ChainExecutionResult>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn runs(&self) -> Vec<ChainExecutionResult> {
        self.runs.read().await.clone()
    }

    pub async fn get(&self, run_id: &str) -> Option<ChainExecutionResult> {
        self.runs
            .read()
            .await
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }
}

#[async_trait]
impl ExecutionRecorder for MemoryRecorder {
    async fn save(&self, result: &ChainExecutionResult) -> Result<(), RecordError> {
        let mut runs = self.runs.write().await;
        if runs.iter().any(|r| r.run_id == result.run_id) {
            return Err(RecordError::AlreadyRecorded(result.run_id.clone()));
        }
        runs.push(result.clone());
        Ok(())
    }
}

/// Writes each run to `<dir>/<run_id>.json`
#[derive(Debug, Clone)]
pub struct JsonDirRecorder {
    dir: PathBuf,
}

impl JsonDirRecorder {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, RecordError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ExecutionRecorder for JsonDirRecorder {
    async fn save(&self, result: &ChainExecutionResult) -> Result<(), RecordError> {
        let path = self.path_for(&result.run_id);
        let json = serde_json::to_vec_pretty(result)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    RecordError::AlreadyRecorded(result.run_id.clone())
                }
                _ => RecordError::Io(e),
            })?;
        file.write_all(&json).await?;
        file.flush().await?;

        debug!("Recorded run {} to {}", result.run_id, path.display());
        Ok(())
    }
}

/// Discards results
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

#[async_trait]
impl ExecutionRecorder for NullRecorder {
    async fn save(&self, _result: &ChainExecutionResult) -> Result<(), RecordError> {
        Ok(())
    }
}
