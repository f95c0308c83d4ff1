//! The authoritative in-memory state machine.
//!
//! A single mutex guards all executions and checkpoints, so every public
//! operation is atomic on its own. Mutations that can unblock a suspended
//! executor signal a [`tokio::sync::Notify`]; executors wait on it with a
//! timeout instead of sleeping blind, so feedback is observed within
//! milliseconds rather than at the next poll tick.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::StoreError;

use super::types::{
    Checkpoint, CheckpointFeedback, CheckpointStatus, Execution, ExecutionState, FeedbackAction,
    is_valid_transition,
};

#[derive(Default)]
struct StoreInner {
    executions: HashMap<String, Execution>,
    checkpoints: HashMap<String, Checkpoint>,
}

/// In-memory store for executions and their checkpoints.
///
/// State is volatile by design: records live for the process lifetime and
/// cancellation is a state transition, never a deletion.
pub struct CheckpointStore {
    inner: Mutex<StoreInner>,
    notify: Notify,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // ── Executions ───────────────────────────────────────────────────────

    /// Register a new execution in `PENDING` state.
    pub fn create_execution(
        &self,
        execution_id: &str,
        inputs: Value,
        checkpoint_names: Vec<String>,
    ) -> Result<Execution, StoreError> {
        let mut inner = self.lock()?;
        if inner.executions.contains_key(execution_id) {
            return Err(StoreError::ExecutionExists {
                id: execution_id.to_string(),
            });
        }
        let execution = Execution::new(execution_id, inputs, checkpoint_names);
        inner
            .executions
            .insert(execution_id.to_string(), execution.clone());
        Ok(execution)
    }

    pub fn get_execution(&self, execution_id: &str) -> Option<Execution> {
        let inner = self.lock().ok()?;
        inner.executions.get(execution_id).cloned()
    }

    /// Overwrite an execution's lifecycle state.
    ///
    /// Returns `false` only when the execution is unknown. Transition
    /// legality is the caller's responsibility; an unsanctioned transition
    /// is logged and applied anyway.
    pub fn update_execution_state(
        &self,
        execution_id: &str,
        new_state: ExecutionState,
        result: Option<Value>,
        error: Option<String>,
    ) -> bool {
        let Ok(mut inner) = self.lock() else {
            return false;
        };
        let Some(execution) = inner.executions.get_mut(execution_id) else {
            debug!(execution_id, "Ignoring state update for unknown execution");
            return false;
        };
        if !is_valid_transition(execution.state, new_state) {
            warn!(
                execution_id,
                from = %execution.state,
                to = %new_state,
                "Unusual execution state transition"
            );
        }
        execution.state = new_state;
        if let Some(result) = result {
            execution.result = Some(result);
        }
        if let Some(error) = error {
            execution.error = Some(error);
        }
        // current_checkpoint is set exactly while waiting for feedback.
        if new_state != ExecutionState::WaitingFeedback {
            execution.current_checkpoint = None;
        }
        execution.updated_at = Utc::now();
        drop(inner);
        self.notify.notify_waiters();
        true
    }

    /// Persist the folded inputs so a later resume sees the phase outputs
    /// and reviewer feedback accumulated before the pause.
    pub fn update_inputs(&self, execution_id: &str, inputs: Value) -> bool {
        let Ok(mut inner) = self.lock() else {
            return false;
        };
        let Some(execution) = inner.executions.get_mut(execution_id) else {
            return false;
        };
        execution.inputs = inputs;
        execution.updated_at = Utc::now();
        true
    }

    /// Cancel a non-terminal execution. Returns `false` when the execution
    /// is unknown or already finished.
    pub fn cancel_execution(&self, execution_id: &str) -> bool {
        let Ok(mut inner) = self.lock() else {
            return false;
        };
        let Some(execution) = inner.executions.get_mut(execution_id) else {
            return false;
        };
        if execution.state.is_terminal() {
            return false;
        }
        execution.state = ExecutionState::Cancelled;
        execution.current_checkpoint = None;
        execution.updated_at = Utc::now();
        drop(inner);
        self.notify.notify_waiters();
        true
    }

    // ── Checkpoints ──────────────────────────────────────────────────────

    /// Record a new pending checkpoint and suspend its owning execution.
    ///
    /// The checkpoint is created even when the execution is unknown; the
    /// execution link is simply skipped. Callers that need the link must
    /// verify the execution exists first.
    pub fn create_checkpoint(
        &self,
        execution_id: &str,
        name: &str,
        description: &str,
        context: Value,
    ) -> Checkpoint {
        let checkpoint = Checkpoint::new(
            Uuid::new_v4().to_string(),
            execution_id,
            name,
            description,
            context,
        );
        let Ok(mut inner) = self.lock() else {
            warn!(
                checkpoint_id = %checkpoint.checkpoint_id,
                "Checkpoint not recorded: store lock unavailable"
            );
            return checkpoint;
        };
        inner
            .checkpoints
            .insert(checkpoint.checkpoint_id.clone(), checkpoint.clone());
        match inner.executions.get_mut(execution_id) {
            Some(execution) => {
                execution.current_checkpoint = Some(checkpoint.checkpoint_id.clone());
                execution.state = ExecutionState::WaitingFeedback;
                execution.updated_at = Utc::now();
            }
            None => warn!(
                execution_id,
                checkpoint_id = %checkpoint.checkpoint_id,
                "Checkpoint created for unknown execution"
            ),
        }
        checkpoint
    }

    pub fn get_checkpoint(&self, checkpoint_id: &str) -> Option<Checkpoint> {
        let inner = self.lock().ok()?;
        inner.checkpoints.get(checkpoint_id).cloned()
    }

    /// The checkpoint currently blocking `execution_id`, if it is still
    /// pending. Returns `None` once resolved, which is how a poller can
    /// tell "resolved" apart from "no checkpoint yet".
    pub fn get_pending_checkpoint(&self, execution_id: &str) -> Option<Checkpoint> {
        let inner = self.lock().ok()?;
        let execution = inner.executions.get(execution_id)?;
        let checkpoint_id = execution.current_checkpoint.as_ref()?;
        inner
            .checkpoints
            .get(checkpoint_id)
            .filter(|checkpoint| checkpoint.status == CheckpointStatus::Pending)
            .cloned()
    }

    // ── Feedback ─────────────────────────────────────────────────────────

    /// Resolve a pending checkpoint with a human decision.
    ///
    /// The status write is one-shot: a second submission for the same
    /// checkpoint returns `false` and changes nothing. Submissions are also
    /// refused when the checkpoint belongs to a different execution or the
    /// owning execution has already reached a terminal state (a late
    /// approval after a timeout or cancellation must not revive it).
    pub fn submit_feedback(
        &self,
        execution_id: &str,
        checkpoint_id: &str,
        action: FeedbackAction,
        feedback_text: Option<String>,
    ) -> bool {
        let Ok(mut inner) = self.lock() else {
            return false;
        };
        let inner = &mut *inner;
        let Some(checkpoint) = inner.checkpoints.get_mut(checkpoint_id) else {
            debug!(checkpoint_id, "Feedback for unknown checkpoint rejected");
            return false;
        };
        if checkpoint.execution_id != execution_id {
            warn!(
                checkpoint_id,
                execution_id, "Feedback rejected: checkpoint belongs to a different execution"
            );
            return false;
        }
        if checkpoint.status.is_resolved() {
            debug!(
                checkpoint_id,
                status = %checkpoint.status,
                "Duplicate feedback ignored"
            );
            return false;
        }
        if let Some(execution) = inner.executions.get(execution_id)
            && execution.state.is_terminal()
        {
            debug!(
                checkpoint_id,
                execution_id,
                state = %execution.state,
                "Late feedback for finished execution ignored"
            );
            return false;
        }

        let now = Utc::now();
        checkpoint.status = action.to_status();
        checkpoint.action = Some(action);
        checkpoint.feedback_text = feedback_text;
        checkpoint.resolved_at = Some(now);

        if let Some(execution) = inner.executions.get_mut(execution_id) {
            execution.completed_checkpoints.push(checkpoint_id.to_string());
            execution.current_checkpoint = None;
            execution.state = if action.resumes() {
                ExecutionState::Running
            } else {
                ExecutionState::Stopped
            };
            execution.updated_at = now;
        }
        self.notify.notify_waiters();
        true
    }

    /// The resolution of a checkpoint, or `None` while it is still pending.
    pub fn checkpoint_feedback(&self, checkpoint_id: &str) -> Option<CheckpointFeedback> {
        let inner = self.lock().ok()?;
        let checkpoint = inner.checkpoints.get(checkpoint_id)?;
        let action = checkpoint.action?;
        Some(CheckpointFeedback {
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            action,
            feedback_text: checkpoint.feedback_text.clone(),
            status: checkpoint.status,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Ids of all unresolved checkpoints, oldest first.
    pub fn list_pending_checkpoints(&self) -> Vec<String> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        let mut pending: Vec<&Checkpoint> = inner
            .checkpoints
            .values()
            .filter(|checkpoint| checkpoint.status == CheckpointStatus::Pending)
            .collect();
        pending.sort_by_key(|checkpoint| checkpoint.created_at);
        pending
            .iter()
            .map(|checkpoint| checkpoint.checkpoint_id.clone())
            .collect()
    }

    /// Ids of all executions still in flight, oldest first.
    pub fn list_active_executions(&self) -> Vec<String> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        let mut active: Vec<&Execution> = inner
            .executions
            .values()
            .filter(|execution| execution.state.is_active())
            .collect();
        active.sort_by_key(|execution| execution.created_at);
        active
            .iter()
            .map(|execution| execution.execution_id.clone())
            .collect()
    }

    /// Every execution the store knows about, oldest first.
    pub fn list_executions(&self) -> Vec<Execution> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        let mut executions: Vec<Execution> = inner.executions.values().cloned().collect();
        executions.sort_by_key(|execution| execution.created_at);
        executions
    }

    // ── Suspension ───────────────────────────────────────────────────────

    /// Wait until a store mutation is signalled or `max_wait` elapses.
    ///
    /// A signal can land between a caller's state check and its wait
    /// registration; the miss is harmless because callers always re-check
    /// after waking, so it costs at most one `max_wait` of latency.
    pub async fn wait_for_change(&self, max_wait: Duration) {
        let _ = tokio::time::timeout(max_wait, self.notify.notified()).await;
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}
