//! Core domain types for executions and checkpoints.
//!
//! An [`Execution`] is one run of a multi-phase workflow; a
//! [`Checkpoint`] is a pause point inside it awaiting human feedback. The
//! state machines here are deliberately small: executions move through a
//! handful of lifecycle states, checkpoints resolve exactly once.

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Execution lifecycle ──────────────────────────────────────────────────

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created but not yet driven.
    Pending,
    /// Actively running a phase.
    Running,
    /// Suspended at a checkpoint, waiting for human feedback.
    WaitingFeedback,
    /// Finished all phases successfully.
    Completed,
    /// Failed with an error.
    Error,
    /// Cancelled by an operator.
    Cancelled,
    /// Halted early by a `stop` feedback decision.
    Stopped,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Running => "running",
            ExecutionState::WaitingFeedback => "waiting_feedback",
            ExecutionState::Completed => "completed",
            ExecutionState::Error => "error",
            ExecutionState::Cancelled => "cancelled",
            ExecutionState::Stopped => "stopped",
        }
    }

    /// Terminal states accept no further writes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed
                | ExecutionState::Error
                | ExecutionState::Cancelled
                | ExecutionState::Stopped
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExecutionState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionState::Pending),
            "running" => Ok(ExecutionState::Running),
            "waiting_feedback" => Ok(ExecutionState::WaitingFeedback),
            "completed" => Ok(ExecutionState::Completed),
            "error" => Ok(ExecutionState::Error),
            "cancelled" => Ok(ExecutionState::Cancelled),
            "stopped" => Ok(ExecutionState::Stopped),
            other => bail!(
                "Unknown execution state '{}' (valid: pending, running, waiting_feedback, \
                 completed, error, cancelled, stopped)",
                other
            ),
        }
    }
}

/// Whether `from -> to` is a sanctioned lifecycle transition.
///
/// Cancellation is reachable from any non-terminal state; everything else
/// follows the run/suspend/resume loop.
pub fn is_valid_transition(from: ExecutionState, to: ExecutionState) -> bool {
    use ExecutionState::*;
    match (from, to) {
        (_, Cancelled) => !from.is_terminal(),
        (Pending, Running) => true,
        (Running, WaitingFeedback) => true,
        (Running, Completed) | (Running, Error) | (Running, Stopped) => true,
        (WaitingFeedback, Running) | (WaitingFeedback, Stopped) => true,
        (WaitingFeedback, Error) => true,
        // The stop path re-writes STOPPED to attach the partial result
        // after feedback has already stopped the execution.
        (Stopped, Stopped) => true,
        _ => false,
    }
}

// ── Checkpoint resolution ────────────────────────────────────────────────

/// Resolution status of a checkpoint. Starts `Pending` and is written
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Approved,
    Rejected,
    Revised,
    Skipped,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Approved => "approved",
            CheckpointStatus::Rejected => "rejected",
            CheckpointStatus::Revised => "revised",
            CheckpointStatus::Skipped => "skipped",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, CheckpointStatus::Pending)
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Human decision submitted against a pending checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackAction {
    /// Accept the phase output and move on.
    Continue,
    /// Halt the execution, keeping work done so far as a partial result.
    Stop,
    /// Move on, feeding the reviewer's notes into later phases.
    Revise,
    /// Move on, explicitly accepting nothing about this phase.
    Skip,
}

impl FeedbackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackAction::Continue => "continue",
            FeedbackAction::Stop => "stop",
            FeedbackAction::Revise => "revise",
            FeedbackAction::Skip => "skip",
        }
    }

    /// The checkpoint status this action resolves to.
    pub fn to_status(&self) -> CheckpointStatus {
        match self {
            FeedbackAction::Continue => CheckpointStatus::Approved,
            FeedbackAction::Stop => CheckpointStatus::Rejected,
            FeedbackAction::Revise => CheckpointStatus::Revised,
            FeedbackAction::Skip => CheckpointStatus::Skipped,
        }
    }

    /// Whether the execution keeps running after this action.
    pub fn resumes(&self) -> bool {
        !matches!(self, FeedbackAction::Stop)
    }
}

impl std::fmt::Display for FeedbackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FeedbackAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(FeedbackAction::Continue),
            "stop" => Ok(FeedbackAction::Stop),
            "revise" => Ok(FeedbackAction::Revise),
            "skip" => Ok(FeedbackAction::Skip),
            other => bail!(
                "Unknown feedback action '{}' (valid: continue, stop, revise, skip)",
                other
            ),
        }
    }
}

// ── Records ──────────────────────────────────────────────────────────────

/// One run of a multi-phase workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    /// Inputs handed to the engine; grows as checkpoint context and
    /// feedback are folded in between phases.
    pub inputs: Value,
    pub state: ExecutionState,
    /// Names of the phases that pause for review, in run order.
    pub checkpoint_names: Vec<String>,
    /// Checkpoint id currently awaiting feedback, if any. Set exactly when
    /// `state` is [`ExecutionState::WaitingFeedback`].
    pub current_checkpoint: Option<String>,
    /// Checkpoint ids already resolved, in resolution order.
    pub completed_checkpoints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    pub fn new(execution_id: impl Into<String>, inputs: Value, checkpoint_names: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            execution_id: execution_id.into(),
            inputs,
            state: ExecutionState::Pending,
            checkpoint_names,
            current_checkpoint: None,
            completed_checkpoints: Vec::new(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A pause point awaiting human feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub execution_id: String,
    /// Phase name this checkpoint guards, e.g. `after_planning`.
    pub name: String,
    pub description: String,
    /// Snapshot of the phase output presented to the reviewer.
    pub context: Value,
    pub status: CheckpointStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<FeedbackAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_text: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(
        checkpoint_id: impl Into<String>,
        execution_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        context: Value,
    ) -> Self {
        Self {
            checkpoint_id: checkpoint_id.into(),
            execution_id: execution_id.into(),
            name: name.into(),
            description: description.into(),
            context,
            status: CheckpointStatus::Pending,
            action: None,
            feedback_text: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

/// Resolution of a checkpoint, as observed by a waiting executor.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointFeedback {
    pub checkpoint_id: String,
    pub action: FeedbackAction,
    pub feedback_text: Option<String>,
    pub status: CheckpointStatus,
}
