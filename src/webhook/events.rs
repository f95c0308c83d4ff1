//! Event taxonomy and records for the webhook transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::ExecutionState;

/// Recognized classes of inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CheckpointRequired,
    TaskCompleted,
    WorkflowCompleted,
    WorkflowFailed,
    /// Anything else; recorded and surfaced, never acted on.
    Generic,
}

impl EventKind {
    /// Classify a sender-supplied event type.
    ///
    /// Exact names match first; unknown types fall back to substring
    /// heuristics so dialect variants (`workflow.completed` next to
    /// `crew.completed`) land in the same bucket.
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            "checkpoint.required" => return Self::CheckpointRequired,
            "task.completed" => return Self::TaskCompleted,
            "crew.completed" | "workflow.completed" => return Self::WorkflowCompleted,
            "crew.failed" | "workflow.failed" => return Self::WorkflowFailed,
            _ => {}
        }
        let lowered = event_type.to_ascii_lowercase();
        if lowered.contains("checkpoint") {
            Self::CheckpointRequired
        } else if lowered.contains("task") {
            Self::TaskCompleted
        } else if lowered.contains("crew") || lowered.contains("workflow") {
            if lowered.contains("complet") {
                Self::WorkflowCompleted
            } else if lowered.contains("fail") || lowered.contains("error") {
                Self::WorkflowFailed
            } else {
                Self::Generic
            }
        } else {
            Self::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CheckpointRequired => "checkpoint_required",
            EventKind::TaskCompleted => "task_completed",
            EventKind::WorkflowCompleted => "workflow_completed",
            EventKind::WorkflowFailed => "workflow_failed",
            EventKind::Generic => "generic",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Infer an event type for payloads that do not name one, from their
/// structure: a checkpoint id wins, then a terminal status, then a bare
/// started event.
pub fn infer_event_type(payload: &Value) -> &'static str {
    if payload.get("checkpoint_id").and_then(Value::as_str).is_some() {
        return "checkpoint.required";
    }
    match payload.get("status").and_then(Value::as_str) {
        Some("complete") | Some("completed") => "crew.completed",
        Some("error") | Some("failed") => "crew.failed",
        _ => "crew.started",
    }
}

/// Processing status of one received event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Retrying,
    Failed,
}

/// One received event and its processing trail.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub event_id: String,
    pub event_type: String,
    pub kind: EventKind,
    pub payload: Value,
    pub status: EventStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

/// Execution record mirrored from an out-of-process engine's events, keyed
/// by the sender's kickoff id.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookExecution {
    pub kickoff_id: String,
    pub state: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_checkpoint: Option<String>,
    /// Checkpoint ids seen for this execution, in arrival order.
    pub checkpoints: Vec<String>,
    pub task_results: Vec<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookExecution {
    pub fn new(kickoff_id: impl Into<String>, state: ExecutionState) -> Self {
        let now = Utc::now();
        Self {
            kickoff_id: kickoff_id.into(),
            state,
            current_checkpoint: None,
            checkpoints: Vec::new(),
            task_results: Vec::new(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One task's output within a webhook-tracked execution.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub output: Value,
    pub completed_at: DateTime<Utc>,
}
