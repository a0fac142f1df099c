//! Chain executor
//!
//! Runs the steps of a chain strictly in ascending `order`, one at a time,
//! threading a single [`VariableStore`] through them. The executor owns only
//! shared, immutable collaborators, so one instance can drive many concurrent
//! runs; every run gets its own store and result.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::error::ChainError;
use super::interrupt::RunInterrupt;
use super::recorder::{self, ExecutionRecorder, NullRecorder};
use super::result::{ChainExecutionResult, ChainStatus, SkipReason, StepExecutionResult, StepStatus};
use super::step_runner::StepRunner;
use crate::bridge::{HttpExecutor, ReqwestExecutor};
use crate::chain::{
    prepare, ChainDefinition, ChainLoader, PlanLimits, PreparedStep, RunnerConfig, VariableStore,
};

/// Executes chain definitions
#[derive(Clone)]
pub struct ChainExecutor {
    http: Arc<dyn HttpExecutor>,
    recorder: Arc<dyn ExecutionRecorder>,
    limits: PlanLimits,
}

impl ChainExecutor {
    /// Executor that records nothing and enforces no plan limits
    pub fn new(http: Arc<dyn HttpExecutor>) -> Self {
        Self {
            http,
            recorder: Arc::new(NullRecorder),
            limits: PlanLimits::default(),
        }
    }

    /// Build the HTTP client, recorder and limits from `runner.yaml`
    pub fn from_config(config: &RunnerConfig) -> Result<Self, ChainError> {
        let http = ReqwestExecutor::from_config(&config.http)?;
        let recorder = recorder::from_config(&config.recorder)?;
        Ok(Self {
            http: Arc::new(http),
            recorder,
            limits: config.limits.clone(),
        })
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn ExecutionRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_limits(mut self, limits: PlanLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &PlanLimits {
        &self.limits
    }

    /// Parse and run a chain from YAML
    #[instrument(skip(self, yaml))]
    pub async fn run_yaml(&self, yaml: &str) -> Result<ChainExecutionResult, ChainError> {
        let chain = ChainLoader::load_str(yaml)?;
        self.run(&chain).await
    }

    /// Run a chain to completion
    pub async fn run(&self, chain: &ChainDefinition) -> Result<ChainExecutionResult, ChainError> {
        self.run_with_cancel(chain, CancellationToken::new()).await
    }

    /// Run a chain, stopping early if `cancel` fires
    ///
    /// Returns `Err` only when the definition fails validation, in which case
    /// no request is sent and nothing is recorded. A cancelled or timed-out run
    /// is a normal result with status `cancelled`.
    #[instrument(skip(self, chain, cancel), fields(chain = %chain.name))]
    pub async fn run_with_cancel(
        &self,
        chain: &ChainDefinition,
        cancel: CancellationToken,
    ) -> Result<ChainExecutionResult, ChainError> {
        let prepared = prepare(chain, &self.limits).map_err(|e| {
            error!("Chain '{}' rejected: {}", chain.name, e);
            e
        })?;

        let run_id = Uuid::new_v4().to_string();
        info!(
            "Starting chain: {} ({} steps, run {})",
            prepared.name,
            prepared.steps.len(),
            run_id
        );

        let mut result = ChainExecutionResult::start(run_id, prepared.name.clone());
        let mut store = VariableStore::new();
        let interrupt = RunInterrupt::new(prepared.timeout, cancel);
        let runner = StepRunner::new(self.http.as_ref());

        // Set when the run ends before the last step
        let mut stopped: Option<ChainStatus> = None;
        let mut steps = prepared.steps.iter();

        while let Some(step) = steps.next() {
            if let Some(reason) = interrupt.check() {
                warn!("Chain '{}' interrupted: {:?}", prepared.name, reason);
                result.push(StepExecutionResult::skipped(step, reason.into()));
                skip_remaining(&mut result, &mut steps, reason.into());
                stopped = Some(ChainStatus::Cancelled);
                break;
            }

            if !step.definition.is_enabled {
                info!("Skipping disabled step: {}", step.name());
                result.push(StepExecutionResult::skipped(step, SkipReason::Disabled));
                continue;
            }

            let previous = result.steps.last().map(StepExecutionResult::as_previous);
            let step_result = runner
                .execute(step, &store, previous.as_ref(), &interrupt)
                .await;

            store.merge(&step_result.extracted);
            let status = step_result.status;
            let cancelled_by = step_result.skip_reason;
            result.push(step_result);

            match status {
                StepStatus::Cancelled => {
                    let reason = cancelled_by.unwrap_or(SkipReason::ChainCancelled);
                    skip_remaining(&mut result, &mut steps, reason);
                    stopped = Some(ChainStatus::Cancelled);
                    break;
                }
                StepStatus::Failed
                    if prepared.stop_on_failure && !step.definition.continue_on_failure =>
                {
                    warn!("Stopping chain '{}' after step {} failed", prepared.name, step.order());
                    skip_remaining(&mut result, &mut steps, SkipReason::StoppedOnFailure);
                    stopped = Some(ChainStatus::Failed);
                    break;
                }
                _ => {}
            }
        }

        let status = stopped.unwrap_or_else(|| result.aggregate_status());
        result.finish(status, store.snapshot());

        info!(
            "Chain '{}' finished: {} ({} succeeded, {} failed, {} skipped)",
            result.chain_name,
            result.status.as_str(),
            result.counts.completed,
            result.counts.failed,
            result.counts.skipped
        );

        if let Err(e) = self.recorder.save(&result).await {
            error!("Failed to record run {}: {}", result.run_id, e);
        }

        Ok(result)
    }
}

fn skip_remaining<'a>(
    result: &mut ChainExecutionResult,
    steps: &mut impl Iterator<Item = &'a PreparedStep>,
    reason: SkipReason,
) {
    for step in steps {
        result.push(StepExecutionResult::skipped(step, reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{HttpResponse, TransportError};
    use crate::chain::ConcreteRequest;
    use crate::engine::recorder::MemoryRecorder;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::time::Duration;

    /// Answers every request with the same status, echoing the URL as the body
    struct Echo(u16);

    #[async_trait]
    impl HttpExecutor for Echo {
        async fn send(
            &self,
            request: &ConcreteRequest,
            _timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                status: self.0,
                headers: BTreeMap::new(),
                body: serde_json::json!({ "url": request.url }).to_string(),
                elapsed_ms: 0,
            })
        }
    }

    const CHAIN: &str = r#"
name: echo
steps:
  - order: 2
    url: "https://api.example.com/{{first}}"
  - order: 1
    url: https://api.example.com/one
    extract:
      first: body.url
"#;

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let executor = ChainExecutor::new(Arc::new(Echo(200)));
        let result = executor.run_yaml(CHAIN).await.unwrap();

        assert_eq!(result.status, ChainStatus::Success);
        let orders: Vec<_> = result.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(
            result.steps[1].request.as_ref().unwrap().url,
            "https://api.example.com/https://api.example.com/one"
        );
        assert!(result.variables.contains_key("first"));
    }

    #[tokio::test]
    async fn test_run_is_recorded_once() {
        let recorder = Arc::new(MemoryRecorder::new());
        let executor = ChainExecutor::new(Arc::new(Echo(500))).with_recorder(recorder.clone());

        let result = executor.run_yaml(CHAIN).await.unwrap();
        assert_eq!(result.status, ChainStatus::Failed);
        assert_eq!(result.steps[1].status, StepStatus::Skipped);

        let runs = recorder.runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, result.run_id);
    }

    #[tokio::test]
    async fn test_rejected_chain_is_not_recorded() {
        let recorder = Arc::new(MemoryRecorder::new());
        let executor = ChainExecutor::new(Arc::new(Echo(200)))
            .with_recorder(recorder.clone())
            .with_limits(PlanLimits {
                max_steps: Some(1),
                ..Default::default()
            });

        let err = executor.run_yaml(CHAIN).await.unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
        assert_eq!(recorder.len().await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let executor = ChainExecutor::new(Arc::new(Echo(200)));
        let chain = ChainLoader::load_str(CHAIN).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = executor.run_with_cancel(&chain, token).await.unwrap();
        assert_eq!(result.status, ChainStatus::Cancelled);
        assert!(result
            .steps
            .iter()
            .all(|s| s.skip_reason == Some(SkipReason::ChainCancelled)));
    }
}
