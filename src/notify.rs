//! Notification seams for checkpoint and lifecycle events.
//!
//! The orchestrator announces noteworthy moments through [`Notifier`] so a
//! deployment can fan out to chat or email without the core knowing about
//! either. The default wiring just logs.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info};

/// Receiver for human-relevant workflow moments.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A checkpoint is pending and someone should go review it.
    async fn checkpoint_required(&self, checkpoint_id: &str, name: &str, context: &Value);

    async fn execution_completed(&self, execution_id: &str, result: &Value);

    async fn execution_failed(&self, execution_id: &str, error: &str);

    /// Anything else worth surfacing, keyed by its raw event type.
    async fn event(&self, event_type: &str, payload: &Value);
}

/// Called once per event whose processing failed permanently, after all
/// retries are spent.
pub trait ErrorHook: Send + Sync {
    fn on_permanent_failure(&self, event_id: &str, event_type: &str, error: &str);
}

/// Notifier that writes to the log and nothing else.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn checkpoint_required(&self, checkpoint_id: &str, name: &str, _context: &Value) {
        info!(checkpoint_id, name, "Checkpoint awaiting feedback");
    }

    async fn execution_completed(&self, execution_id: &str, _result: &Value) {
        info!(execution_id, "Execution completed");
    }

    async fn execution_failed(&self, execution_id: &str, error: &str) {
        error!(execution_id, error, "Execution failed");
    }

    async fn event(&self, event_type: &str, _payload: &Value) {
        debug!(event_type, "Workflow event received");
    }
}

/// Error hook that records permanent failures in the log.
pub struct LogErrorHook;

impl ErrorHook for LogErrorHook {
    fn on_permanent_failure(&self, event_id: &str, event_type: &str, error: &str) {
        error!(
            event_id,
            event_type, error, "Event processing failed permanently"
        );
    }
}
