//! Directory-based chain runner
//!
//! Load every chain in a directory and run them concurrently, bounded by
//! `parallel`. Chains are independent: each run gets its own variable store,
//! while the HTTP executor, recorder and cancellation token are shared.
//!
//! ```yaml
//! # runner.yaml
//! parallel: 4
//! recorder:
//!   type: json_dir
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::error::ChainError;
use super::executor::ChainExecutor;
use super::result::ChainExecutionResult;
use crate::chain::{ChainLoader, LoadError, RunnerConfig};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryRunError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Executor error: {0}")]
    Executor(#[from] ChainError),
}

/// A chain file that could not be loaded or was rejected before running
#[derive(Debug)]
pub struct ChainFailure {
    /// File path, or chain name once the file parsed
    pub source: String,
    pub error: ChainError,
}

#[derive(Debug, Default)]
pub struct DirectoryResult {
    /// Completed runs, in file order
    pub runs: Vec<ChainExecutionResult>,
    pub failures: Vec<ChainFailure>,
}

impl DirectoryResult {
    /// Every chain ran and succeeded
    pub fn success(&self) -> bool {
        self.failures.is_empty() && self.runs.iter().all(|r| r.is_success())
    }

    pub fn get(&self, chain_name: &str) -> Option<&ChainExecutionResult> {
        self.runs.iter().find(|r| r.chain_name == chain_name)
    }
}

pub async fn run_chain_directory(
    dir: impl AsRef<Path>,
) -> Result<DirectoryResult, DirectoryRunError> {
    ChainDirectoryRunner::new(dir).run().await
}

pub struct ChainDirectoryRunner {
    directory: PathBuf,
    max_concurrent: usize,
    config: RunnerConfig,
    filter: Option<Box<dyn Fn(&str) -> bool + Send + Sync>>,
    executor: Option<Arc<ChainExecutor>>,
    cancel: CancellationToken,
}

impl ChainDirectoryRunner {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self::with_config(directory, RunnerConfig::default())
    }

    pub fn with_config(directory: impl AsRef<Path>, config: RunnerConfig) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            max_concurrent: config.parallel,
            config,
            filter: None,
            executor: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn parallel(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(f));
        self
    }

    /// Only run chains whose name starts with `prefix`
    ///
    /// Files that fail to load are reported only when their file stem passes
    /// the filter.
    pub fn name_prefix(self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.filter(move |name| name.starts_with(&prefix))
    }

    /// Use `executor` instead of building one from the runner config
    pub fn executor(mut self, executor: Arc<ChainExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Token that cancels every chain in the directory
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A file whose chain name is unknown is matched on its file stem
    fn selects_file(&self, path: &Path) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .map_or(true, |stem| filter(stem))
    }

    pub async fn run(self) -> Result<DirectoryResult, DirectoryRunError> {
        let executor = match &self.executor {
            Some(executor) => executor.clone(),
            None => Arc::new(ChainExecutor::from_config(&self.config)?),
        };

        let mut result = DirectoryResult::default();
        let mut chains = Vec::new();

        for path in ChainLoader::chain_files(&self.directory)? {
            match ChainLoader::load_file(&path) {
                Ok(chain) => chains.push(chain),
                Err(e) if !self.selects_file(&path) => {
                    debug!("Skipping unloadable {} outside the filter: {}", path.display(), e);
                }
                Err(e) => {
                    error!("Failed to load {}: {}", path.display(), e);
                    result.failures.push(ChainFailure {
                        source: path.display().to_string(),
                        error: e.into(),
                    });
                }
            }
        }

        if let Some(filter) = &self.filter {
            chains.retain(|c| filter(&c.name));
        }

        info!(
            "Running {} chains from {} (parallel: {})",
            chains.len(),
            self.directory.display(),
            self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent.max(1)));
        let futures: Vec<_> = chains
            .into_iter()
            .map(|chain| {
                let executor = executor.clone();
                let semaphore = semaphore.clone();
                let cancel = self.cancel.clone();
                async move {
                    // The semaphore is never closed
                    let _permit = semaphore.acquire_owned().await.ok();
                    let outcome = executor.run_with_cancel(&chain, cancel).await;
                    (chain.name, outcome)
                }
            })
            .collect();

        for (name, outcome) in join_all(futures).await {
            match outcome {
                Ok(run) => result.runs.push(run),
                Err(error) => result.failures.push(ChainFailure {
                    source: name,
                    error,
                }),
            }
        }

        Ok(result)
    }
}
