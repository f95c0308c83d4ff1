//! Typed error hierarchy for the greenlight orchestrator.
//!
//! Four top-level enums cover the four subsystems:
//! - `StoreError`: checkpoint/execution store failures
//! - `ExecutorError`: phased execution failures
//! - `EngineError`: workflow engine adapter failures
//! - `WebhookError`: webhook event processing failures

use std::time::Duration;

use thiserror::Error;

/// Errors from the checkpoint/execution store.
///
/// Lookups that miss return `Option`/`bool` rather than an error; only
/// creation conflicts and lock poisoning surface here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Execution {id} already exists")]
    ExecutionExists { id: String },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from driving a phased execution.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Execution {id} not found")]
    ExecutionNotFound { id: String },

    #[error("Execution {id} is already being driven")]
    AlreadyInFlight { id: String },

    #[error("Checkpoint '{name}' timed out after {waited:?} waiting for feedback")]
    FeedbackTimeout { name: String, waited: Duration },

    #[error("Execution {id} was cancelled")]
    Cancelled { id: String },

    #[error("Engine failure in phase '{phase}': {message}")]
    Engine { phase: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the command-based workflow engine adapter.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to spawn engine command '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine exited with non-zero code {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },

    #[error("Engine produced invalid output: {0}")]
    InvalidOutput(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from webhook event processing and webhook-side feedback.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Checkpoint {id} not found")]
    UnknownCheckpoint { id: String },

    #[error("Checkpoint {id} already resolved")]
    AlreadyResolved { id: String },

    #[error("Event payload missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
