//! Single-step execution
//!
//! A step runs in this order: evaluate its condition, materialize the request
//! once, send it up to `retry_count + 1` times with a fixed delay between
//! attempts, classify the final attempt and run the extraction rules on a
//! successful response. Every wait races the run interrupt, so a chain timeout
//! or cancellation stops the step mid-attempt or mid-delay.

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::interrupt::{InterruptReason, RunInterrupt};
use super::result::{
    AttemptRecord, ErrorKind, ExtractionOmission, ResponseRecord, SkipReason, StepError,
    StepExecutionResult, StepStatus,
};
use crate::bridge::{HttpExecutor, HttpResponse};
use crate::chain::{ConcreteRequest, PreparedStep, PreviousStep, VariableStore};

enum AttemptOutcome {
    Success(HttpResponse),
    Failed {
        error: StepError,
        response: Option<HttpResponse>,
    },
    Interrupted(InterruptReason),
}

impl AttemptOutcome {
    fn record(&self, attempt: u32, duration_ms: u64) -> AttemptRecord {
        let (status_code, error) = match self {
            AttemptOutcome::Success(response) => (Some(response.status), None),
            AttemptOutcome::Failed { error, response } => {
                (response.as_ref().map(|r| r.status), Some(error.clone()))
            }
            AttemptOutcome::Interrupted(_) => (None, None),
        };
        AttemptRecord {
            attempt,
            status_code,
            error,
            duration_ms,
        }
    }
}

/// Runs one prepared step against an [`HttpExecutor`]
pub struct StepRunner<'a> {
    http: &'a dyn HttpExecutor,
}

impl<'a> StepRunner<'a> {
    pub fn new(http: &'a dyn HttpExecutor) -> Self {
        Self { http }
    }

    /// Execute `step`; the result is always terminal
    #[instrument(skip_all, fields(order = step.order(), step = %step.name()))]
    pub async fn execute(
        &self,
        step: &PreparedStep,
        store: &VariableStore,
        previous: Option<&PreviousStep>,
        interrupt: &RunInterrupt,
    ) -> StepExecutionResult {
        let started = Instant::now();
        let mut result = StepExecutionResult::pending(step);
        result.started_at = Some(Utc::now());

        if let Some(condition) = &step.condition {
            let outcome = condition.evaluate(store, previous);
            if let Some(reason) = &outcome.reason {
                warn!("Condition for step '{}' not evaluable: {}", result.name, reason);
            }
            let met = outcome.met;
            result.condition = Some(outcome);
            if !met {
                info!("Skipping step '{}' due to condition", result.name);
                result.skip(SkipReason::ConditionNotMet);
                return result;
            }
        }

        result.transition(StepStatus::Running);
        let request = step.request.materialize(store);
        if !request.unresolved.is_empty() {
            warn!(
                "Step '{}' has unresolved references: {}",
                result.name,
                request.unresolved.join(", ")
            );
        }
        info!("Executing step: {} {} {}", result.name, request.method, request.url);

        let max_attempts = step.definition.retry_count.saturating_add(1);
        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            let attempt_started = Instant::now();
            let outcome = self.attempt(step, &request, interrupt).await;
            if matches!(outcome, AttemptOutcome::Interrupted(_)) {
                break outcome;
            }

            let elapsed = attempt_started.elapsed().as_millis() as u64;
            result.attempts.push(outcome.record(attempt, elapsed));

            let error = match &outcome {
                AttemptOutcome::Failed { error, .. } if attempt < max_attempts => {
                    error.message.clone()
                }
                _ => break outcome,
            };
            warn!(
                "Attempt {}/{} of step '{}' failed: {}",
                attempt, max_attempts, result.name, error
            );

            debug!("Retrying in {}ms", step.definition.retry_delay);
            if let Err(reason) = interrupt.sleep(step.retry_delay()).await {
                break AttemptOutcome::Interrupted(reason);
            }
        };

        result.request = Some(request);
        match outcome {
            AttemptOutcome::Success(response) => {
                result.response = Some(ResponseRecord::from(&response));
                extract_variables(step, &response, &mut result);
                let status = if result.error.is_some() {
                    StepStatus::Failed
                } else {
                    StepStatus::Success
                };
                result.transition(status);
            }
            AttemptOutcome::Failed { error, response } => {
                warn!("Step '{}' failed: {}", result.name, error.message);
                result.response = response.as_ref().map(ResponseRecord::from);
                result.error = Some(error);
                result.transition(StepStatus::Failed);
            }
            AttemptOutcome::Interrupted(reason) => {
                warn!("Step '{}' interrupted: {:?}", result.name, reason);
                result.transition(StepStatus::Cancelled);
                result.skip_reason = Some(reason.into());
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            "Step '{}' finished: {} in {}ms",
            result.name,
            result.status.as_str(),
            result.duration_ms
        );
        result
    }

    async fn attempt(
        &self,
        step: &PreparedStep,
        request: &ConcreteRequest,
        interrupt: &RunInterrupt,
    ) -> AttemptOutcome {
        let timeout = step.timeout();
        let send = tokio::time::timeout(timeout, self.http.send(request, timeout));

        tokio::select! {
            biased;
            reason = interrupt.wait() => AttemptOutcome::Interrupted(reason),
            sent = send => match sent {
                Err(_) => AttemptOutcome::Failed {
                    error: StepError::new(
                        ErrorKind::Timeout,
                        format!("Request timed out after {}ms", step.definition.timeout),
                    ),
                    response: None,
                },
                Ok(Err(e)) => AttemptOutcome::Failed {
                    error: StepError::from(&e),
                    response: None,
                },
                Ok(Ok(response)) if step.definition.accepts_status(response.status) => {
                    AttemptOutcome::Success(response)
                }
                Ok(Ok(response)) => AttemptOutcome::Failed {
                    error: StepError::new(
                        ErrorKind::HttpError,
                        format!("Unexpected status {}", response.status),
                    ),
                    response: Some(response),
                },
            },
        }
    }
}

/// Apply the step's extraction rules; a missing required value sets an
/// extraction error on the result
fn extract_variables(step: &PreparedStep, response: &HttpResponse, result: &mut StepExecutionResult) {
    let mut missing = Vec::new();

    for rule in &step.extract {
        match rule.source.extract(response) {
            Ok(value) => {
                debug!("Extracted {} from {}", rule.variable, rule.rule.from);
                result.extracted.insert(rule.variable.clone(), value);
            }
            Err(e) => match &rule.rule.default {
                Some(default) => {
                    debug!("Using default for {}: {}", rule.variable, e);
                    result.extracted.insert(rule.variable.clone(), default.clone());
                }
                None => {
                    if rule.rule.required {
                        missing.push(format!("{} ({})", rule.variable, e));
                    }
                    result.omitted.push(ExtractionOmission {
                        variable: rule.variable.clone(),
                        reason: e.to_string(),
                    });
                }
            },
        }
    }

    if !missing.is_empty() {
        result.error = Some(StepError::new(
            ErrorKind::ExtractionError,
            format!("Required variables not extracted: {}", missing.join(", ")),
        ));
    }
}
