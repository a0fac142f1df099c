//! Execution result types
//!
//! A run produces one [`ChainExecutionResult`] holding one
//! [`StepExecutionResult`] per defined step, in ascending order, with skipped
//! steps present rather than omitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::bridge::{HttpResponse, TransportError};
use crate::chain::{ConcreteRequest, ConditionOutcome, PreparedStep, PreviousStep};

/// Step lifecycle: `pending -> running -> {success, failed, skipped, cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Success | StepStatus::Failed | StepStatus::Skipped | StepStatus::Cancelled
        )
    }

    /// Whether the step state machine allows moving to `next`
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        match self {
            // Skipped and cancelled steps never start
            StepStatus::Pending => matches!(
                next,
                StepStatus::Running | StepStatus::Skipped | StepStatus::Cancelled
            ),
            StepStatus::Running => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Cancelled => "cancelled",
        }
    }
}

/// Chain lifecycle: `pending -> running -> {success, failed, partial, cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Pending,
    Running,
    Success,
    Failed,
    Partial,
    Cancelled,
}

impl ChainStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChainStatus::Success | ChainStatus::Failed | ChainStatus::Partial | ChainStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: ChainStatus) -> bool {
        match self {
            ChainStatus::Pending => next == ChainStatus::Running,
            ChainStatus::Running => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainStatus::Pending => "pending",
            ChainStatus::Running => "running",
            ChainStatus::Success => "success",
            ChainStatus::Failed => "failed",
            ChainStatus::Partial => "partial",
            ChainStatus::Cancelled => "cancelled",
        }
    }
}

/// Kind of step failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnectionError,
    HttpError,
    ExtractionError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&TransportError> for StepError {
    fn from(error: &TransportError) -> Self {
        let kind = match error {
            TransportError::Timeout(_) => ErrorKind::Timeout,
            TransportError::Connection(_)
            | TransportError::InvalidRequest(_)
            | TransportError::Setup(_) => ErrorKind::ConnectionError,
        };
        StepError::new(kind, error.to_string())
    }
}

/// Why a step did not run (or did not finish)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    ConditionNotMet,
    StoppedOnFailure,
    ChainTimeout,
    ChainCancelled,
}

/// Response as recorded on a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub size: usize,
    pub elapsed_ms: u64,
}

impl From<&HttpResponse> for ResponseRecord {
    fn from(response: &HttpResponse) -> Self {
        Self {
            status_code: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            size: response.size(),
            elapsed_ms: response.elapsed_ms,
        }
    }
}

/// One network attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    pub duration_ms: u64,
}

/// An extraction rule that produced no value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOmission {
    pub variable: String,
    pub reason: String,
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub order: u32,
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionOutcome>,
    /// Request actually sent, after substitution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ConcreteRequest>,
    /// Response to the final attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseRecord>,
    /// Error of the final attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
    #[serde(default)]
    pub extracted: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omitted: Vec<ExtractionOmission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl StepExecutionResult {
    pub fn pending(step: &PreparedStep) -> Self {
        Self {
            order: step.order(),
            name: step.name(),
            status: StepStatus::Pending,
            skip_reason: None,
            condition: None,
            request: None,
            response: None,
            error: None,
            attempts: Vec::new(),
            extracted: BTreeMap::new(),
            omitted: Vec::new(),
            started_at: None,
            duration_ms: 0,
        }
    }

    /// A step that was never attempted
    pub fn skipped(step: &PreparedStep, reason: SkipReason) -> Self {
        let mut result = Self::pending(step);
        result.skip(reason);
        result
    }

    /// Move to `next`, ignoring transitions the state machine forbids
    pub fn transition(&mut self, next: StepStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    pub fn skip(&mut self, reason: SkipReason) {
        if self.transition(StepStatus::Skipped) {
            self.skip_reason = Some(reason);
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status_code)
    }

    /// The view of this result that the next step's condition can read
    pub fn as_previous(&self) -> PreviousStep {
        PreviousStep {
            status: self.status.as_str().to_string(),
            status_code: self.status_code(),
            duration_ms: self.duration_ms,
        }
    }
}

/// Per-status step counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCounts {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

/// Result of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainExecutionResult {
    pub run_id: String,
    pub chain_name: String,
    pub status: ChainStatus,
    pub steps: Vec<StepExecutionResult>,
    pub counts: ChainCounts,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Variable store contents when the run ended
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

impl ChainExecutionResult {
    /// A new result in the `running` state
    pub fn start(run_id: impl Into<String>, chain_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            chain_name: chain_name.into(),
            status: ChainStatus::Running,
            steps: Vec::new(),
            counts: ChainCounts::default(),
            started_at: Utc::now(),
            finished_at: None,
            variables: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, step: StepExecutionResult) {
        self.steps.push(step);
    }

    /// Status implied by step outcomes when the run was not cut short
    pub fn aggregate_status(&self) -> ChainStatus {
        let failed = self.steps.iter().any(|s| s.status == StepStatus::Failed);
        let succeeded = self.steps.iter().any(|s| s.status == StepStatus::Success);
        match (failed, succeeded) {
            (false, _) => ChainStatus::Success,
            (true, true) => ChainStatus::Partial,
            (true, false) => ChainStatus::Failed,
        }
    }

    /// Enter a terminal state; a finished result is never changed again
    pub fn finish(&mut self, status: ChainStatus, variables: BTreeMap<String, Value>) {
        if !self.status.can_transition_to(status) {
            return;
        }
        self.status = status;
        self.variables = variables;
        self.counts = self.count_steps();
        self.finished_at = Some(Utc::now());
    }

    fn count_steps(&self) -> ChainCounts {
        let count = |status: StepStatus| self.steps.iter().filter(|s| s.status == status).count();
        ChainCounts {
            total: self.steps.len(),
            completed: count(StepStatus::Success),
            failed: count(StepStatus::Failed),
            skipped: count(StepStatus::Skipped),
            cancelled: count(StepStatus::Cancelled),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ChainStatus::Success
    }

    pub fn step(&self, order: u32) -> Option<&StepExecutionResult> {
        self.steps.iter().find(|s| s.order == order)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
