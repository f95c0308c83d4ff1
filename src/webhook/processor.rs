//! The webhook event processor.
//!
//! An out-of-process engine reports progress as signed events; this module
//! converges them into the same logical states the in-process store uses.
//! Events are applied with bounded retries, and every upsert is keyed by
//! the sender's identifiers so redelivery and out-of-order arrival are
//! no-ops rather than corruption.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};
use crate::errors::WebhookError;
use crate::notify::{ErrorHook, LogErrorHook, LogNotifier, Notifier};
use crate::store::{Checkpoint, CheckpointStatus, ExecutionState, FeedbackAction};

use super::events::{EventKind, EventRecord, EventStatus, TaskResult, WebhookExecution};

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Re-attempts after the first failed application of an event.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl ProcessorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Counters for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorStats {
    pub pending_events: usize,
    pub processed_events: usize,
    pub failed_events: usize,
    pub pending_checkpoints: usize,
}

#[derive(Default)]
struct ProcessorInner {
    events: HashMap<String, EventRecord>,
    checkpoints: HashMap<String, Checkpoint>,
    executions: HashMap<String, WebhookExecution>,
}

/// Ingests webhook events and maintains the webhook-sourced mirror of
/// checkpoints and executions.
pub struct WebhookProcessor {
    inner: Mutex<ProcessorInner>,
    config: ProcessorConfig,
    notifier: Arc<dyn Notifier>,
    error_hook: Arc<dyn ErrorHook>,
}

impl WebhookProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            inner: Mutex::new(ProcessorInner::default()),
            config,
            notifier: Arc::new(LogNotifier),
            error_hook: Arc::new(LogErrorHook),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_error_hook(mut self, error_hook: Arc<dyn ErrorHook>) -> Self {
        self.error_hook = error_hook;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ProcessorInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store_event(&self, record: &EventRecord) {
        self.lock()
            .events
            .insert(record.event_id.clone(), record.clone());
    }

    /// Ingest one event: record it, then apply it with bounded retries.
    ///
    /// Total attempts are `1 + max_retries`. Exhausting them marks the
    /// event permanently failed and fires the error hook exactly once.
    /// The returned record is the event's final state.
    pub async fn process_event(&self, event_type: &str, payload: Value) -> EventRecord {
        let kind = EventKind::classify(event_type);
        let kickoff = payload_kickoff(&payload).unwrap_or("unknown").to_string();
        let event_id = format!("{}:{}:{}", event_type, kickoff, Uuid::new_v4());

        let mut payload = payload;
        if let Value::Object(object) = &mut payload
            && !object.contains_key("timestamp")
        {
            object.insert(
                "timestamp".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }

        let mut record = EventRecord {
            event_id,
            event_type: event_type.to_string(),
            kind,
            payload,
            status: EventStatus::Pending,
            retry_count: 0,
            error: None,
            received_at: Utc::now(),
            processed_at: None,
        };
        self.store_event(&record);

        let total_attempts = 1 + self.config.max_retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            record.status = EventStatus::Processing;
            self.store_event(&record);

            match self.apply(kind, &record.payload).await {
                Ok(()) => {
                    record.status = EventStatus::Completed;
                    record.processed_at = Some(Utc::now());
                    self.store_event(&record);
                    debug!(event_id = %record.event_id, event_type, "Event processed");
                    self.notifier.event(event_type, &record.payload).await;
                    return record;
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(
                        event_id = %record.event_id,
                        event_type,
                        attempt,
                        error = %message,
                        "Event processing failed"
                    );
                    record.error = Some(message.clone());
                    if attempt >= total_attempts {
                        record.status = EventStatus::Failed;
                        record.processed_at = Some(Utc::now());
                        self.store_event(&record);
                        self.error_hook.on_permanent_failure(
                            &record.event_id,
                            event_type,
                            &message,
                        );
                        return record;
                    }
                    record.status = EventStatus::Retrying;
                    record.retry_count = attempt;
                    self.store_event(&record);
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    async fn apply(&self, kind: EventKind, payload: &Value) -> Result<(), WebhookError> {
        match kind {
            EventKind::CheckpointRequired => self.apply_checkpoint_required(payload).await,
            EventKind::TaskCompleted => self.apply_task_completed(payload),
            EventKind::WorkflowCompleted => self.apply_workflow_completed(payload).await,
            EventKind::WorkflowFailed => self.apply_workflow_failed(payload).await,
            EventKind::Generic => Ok(()),
        }
    }

    /// Upsert a checkpoint by the sender's id and suspend its execution.
    /// Redelivered checkpoints are strict no-ops so the first stored record
    /// (and any resolution it has since received) stands.
    async fn apply_checkpoint_required(&self, payload: &Value) -> Result<(), WebhookError> {
        let checkpoint_id = payload
            .get("checkpoint_id")
            .and_then(Value::as_str)
            .ok_or(WebhookError::MissingField {
                field: "checkpoint_id",
            })?;
        let name = payload
            .get("checkpoint_name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let description = payload
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let context = payload
            .get("context")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let kickoff = payload_kickoff(payload);

        let mut newly_created: Option<Checkpoint> = None;
        {
            let mut inner = self.lock();
            let inner = &mut *inner;
            if inner.checkpoints.contains_key(checkpoint_id) {
                debug!(checkpoint_id, "Duplicate checkpoint event ignored");
            } else {
                let checkpoint = Checkpoint::new(
                    checkpoint_id,
                    kickoff.unwrap_or("unknown"),
                    name,
                    description,
                    context,
                );
                inner
                    .checkpoints
                    .insert(checkpoint_id.to_string(), checkpoint.clone());
                newly_created = Some(checkpoint);
            }

            if newly_created.is_some()
                && let Some(kickoff) = kickoff
            {
                let execution = inner
                    .executions
                    .entry(kickoff.to_string())
                    .or_insert_with(|| WebhookExecution::new(kickoff, ExecutionState::Running));
                if execution.state.is_terminal() {
                    debug!(
                        kickoff,
                        checkpoint_id, "Checkpoint for finished execution recorded; not reviving"
                    );
                } else {
                    execution.checkpoints.push(checkpoint_id.to_string());
                    execution.current_checkpoint = Some(checkpoint_id.to_string());
                    execution.state = ExecutionState::WaitingFeedback;
                    execution.updated_at = Utc::now();
                }
            }
        }

        if let Some(checkpoint) = newly_created {
            info!(
                checkpoint_id = %checkpoint.checkpoint_id,
                name = %checkpoint.name,
                "Webhook checkpoint recorded"
            );
            self.notifier
                .checkpoint_required(
                    &checkpoint.checkpoint_id,
                    &checkpoint.name,
                    &checkpoint.context,
                )
                .await;
        }
        Ok(())
    }

    /// Record a task-scoped result without touching lifecycle state.
    fn apply_task_completed(&self, payload: &Value) -> Result<(), WebhookError> {
        let kickoff = payload_kickoff(payload).ok_or(WebhookError::MissingField {
            field: "kickoff_id",
        })?;
        let task_id = payload
            .get("task_id")
            .or_else(|| payload.get("id"))
            .and_then(Value::as_str)
            .ok_or(WebhookError::MissingField { field: "task_id" })?;
        let output = payload
            .get("output")
            .or_else(|| payload.get("result"))
            .cloned()
            .unwrap_or(Value::Null);

        let mut inner = self.lock();
        let execution = inner
            .executions
            .entry(kickoff.to_string())
            .or_insert_with(|| WebhookExecution::new(kickoff, ExecutionState::Running));
        let result = TaskResult {
            task_id: task_id.to_string(),
            output,
            completed_at: Utc::now(),
        };
        // Upsert by task id so redelivery replaces instead of duplicating.
        match execution
            .task_results
            .iter_mut()
            .find(|existing| existing.task_id == task_id)
        {
            Some(existing) => *existing = result,
            None => execution.task_results.push(result),
        }
        execution.updated_at = Utc::now();
        debug!(kickoff, task_id, "Task result recorded");
        Ok(())
    }

    async fn apply_workflow_completed(&self, payload: &Value) -> Result<(), WebhookError> {
        let kickoff = payload_kickoff(payload).ok_or(WebhookError::MissingField {
            field: "kickoff_id",
        })?;
        let result = payload
            .get("result")
            .or_else(|| payload.get("output"))
            .cloned()
            .unwrap_or(Value::Null);

        let applied = {
            let mut inner = self.lock();
            let execution = inner
                .executions
                .entry(kickoff.to_string())
                .or_insert_with(|| WebhookExecution::new(kickoff, ExecutionState::Running));
            if execution.state.is_terminal() {
                debug!(kickoff, state = %execution.state, "Completion event for finished execution ignored");
                false
            } else {
                execution.state = ExecutionState::Completed;
                execution.result = Some(result.clone());
                execution.current_checkpoint = None;
                execution.updated_at = Utc::now();
                true
            }
        };
        if applied {
            info!(kickoff, "Webhook execution completed");
            self.notifier.execution_completed(kickoff, &result).await;
        }
        Ok(())
    }

    async fn apply_workflow_failed(&self, payload: &Value) -> Result<(), WebhookError> {
        let kickoff = payload_kickoff(payload).ok_or(WebhookError::MissingField {
            field: "kickoff_id",
        })?;
        let error = payload
            .get("error")
            .or_else(|| payload.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();

        let applied = {
            let mut inner = self.lock();
            let execution = inner
                .executions
                .entry(kickoff.to_string())
                .or_insert_with(|| WebhookExecution::new(kickoff, ExecutionState::Running));
            if execution.state.is_terminal() {
                debug!(kickoff, state = %execution.state, "Failure event for finished execution ignored");
                false
            } else {
                execution.state = ExecutionState::Error;
                execution.error = Some(error.clone());
                execution.current_checkpoint = None;
                execution.updated_at = Utc::now();
                true
            }
        };
        if applied {
            warn!(kickoff, error = %error, "Webhook execution failed");
            self.notifier.execution_failed(kickoff, &error).await;
        }
        Ok(())
    }

    /// Resolve a webhook-tracked checkpoint with a human decision.
    ///
    /// Same one-shot semantics as the store's feedback path, except the
    /// rejections are named errors because this is a direct caller-facing
    /// operation.
    pub fn process_feedback(
        &self,
        checkpoint_id: &str,
        action: FeedbackAction,
        feedback_text: Option<String>,
    ) -> Result<Checkpoint, WebhookError> {
        let resolved = {
            let mut inner = self.lock();
            let inner = &mut *inner;
            let checkpoint = inner.checkpoints.get_mut(checkpoint_id).ok_or_else(|| {
                WebhookError::UnknownCheckpoint {
                    id: checkpoint_id.to_string(),
                }
            })?;
            if checkpoint.status.is_resolved() {
                return Err(WebhookError::AlreadyResolved {
                    id: checkpoint_id.to_string(),
                });
            }
            let now = Utc::now();
            checkpoint.status = action.to_status();
            checkpoint.action = Some(action);
            checkpoint.feedback_text = feedback_text;
            checkpoint.resolved_at = Some(now);

            if let Some(execution) = inner.executions.get_mut(&checkpoint.execution_id)
                && !execution.state.is_terminal()
            {
                execution.current_checkpoint = None;
                execution.state = if action.resumes() {
                    ExecutionState::Running
                } else {
                    ExecutionState::Stopped
                };
                execution.updated_at = now;
            }
            checkpoint.clone()
        };
        info!(checkpoint_id, action = %action, "Webhook checkpoint resolved");
        Ok(resolved)
    }

    pub fn get_event(&self, event_id: &str) -> Option<EventRecord> {
        self.lock().events.get(event_id).cloned()
    }

    pub fn get_checkpoint(&self, checkpoint_id: &str) -> Option<Checkpoint> {
        self.lock().checkpoints.get(checkpoint_id).cloned()
    }

    pub fn get_execution(&self, kickoff_id: &str) -> Option<WebhookExecution> {
        self.lock().executions.get(kickoff_id).cloned()
    }

    pub fn stats(&self) -> ProcessorStats {
        let inner = self.lock();
        ProcessorStats {
            pending_events: inner
                .events
                .values()
                .filter(|event| {
                    matches!(
                        event.status,
                        EventStatus::Pending | EventStatus::Processing | EventStatus::Retrying
                    )
                })
                .count(),
            processed_events: inner
                .events
                .values()
                .filter(|event| event.status == EventStatus::Completed)
                .count(),
            failed_events: inner
                .events
                .values()
                .filter(|event| event.status == EventStatus::Failed)
                .count(),
            pending_checkpoints: inner
                .checkpoints
                .values()
                .filter(|checkpoint| checkpoint.status == CheckpointStatus::Pending)
                .count(),
        }
    }
}

fn payload_kickoff(payload: &Value) -> Option<&str> {
    payload
        .get("kickoff_id")
        .or_else(|| payload.get("execution_id"))
        .and_then(Value::as_str)
}
