//! HTTP surface: the management API over the store/executor and the
//! webhook endpoints over the event processor.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{StoreError, WebhookError};
use crate::executor::PhasedExecutor;
use crate::store::{CheckpointStore, FeedbackAction};
use crate::webhook::security::{SECRET_HEADER, SIGNATURE_HEADER};
use crate::webhook::{WebhookProcessor, WebhookSecurity, infer_event_type};

/// Checkpoints enabled when the caller does not name any.
pub const DEFAULT_CHECKPOINTS: &[&str] = &["after_planning", "after_analysis"];

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub store: Arc<CheckpointStore>,
    pub executor: Arc<PhasedExecutor>,
    pub processor: Arc<WebhookProcessor>,
    pub security: WebhookSecurity,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub inputs: Option<Value>,
    pub checkpoint_names: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub execution_id: String,
    pub checkpoint_id: String,
    pub action: String,
    pub feedback: Option<String>,
}

#[derive(Deserialize)]
pub struct WebhookFeedbackRequest {
    pub checkpoint_id: String,
    pub action: String,
    pub feedback: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route(
            "/api/executions",
            get(list_executions).post(create_execution),
        )
        .route(
            "/api/executions/{id}",
            get(get_execution).delete(cancel_execution),
        )
        .route("/api/executions/{id}/checkpoint", get(pending_checkpoint))
        .route("/api/feedback", post(submit_feedback))
        .route("/webhooks/events", post(receive_event))
        .route("/webhooks/feedback", post(webhook_feedback))
        .route("/webhooks/checkpoints/{id}", get(get_webhook_checkpoint))
        .route("/webhooks/executions/{id}", get(get_webhook_execution))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

// ── Service handlers ──────────────────────────────────────────────────

async fn service_info() -> impl IntoResponse {
    Json(json!({
        "service": "greenlight",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "executions": "/api/executions",
            "feedback": "/api/feedback",
            "webhook_events": "/webhooks/events",
            "webhook_feedback": "/webhooks/feedback",
            "health": "/health",
        },
    }))
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let stats = state.processor.stats();
    Json(json!({
        "status": "healthy",
        "executions": {
            "active": state.store.list_active_executions().len(),
        },
        "checkpoints": {
            "pending": state.store.list_pending_checkpoints().len() + stats.pending_checkpoints,
        },
        "events": {
            "pending": stats.pending_events,
            "processed": stats.processed_events,
            "failed": stats.failed_events,
        },
    }))
}

// ── Execution handlers ────────────────────────────────────────────────

async fn create_execution(
    State(state): State<SharedState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let inputs = req.inputs.unwrap_or_else(|| json!({}));
    if !inputs.is_object() {
        return Err(ApiError::BadRequest(
            "inputs must be a JSON object".to_string(),
        ));
    }
    let checkpoint_names = req.checkpoint_names.unwrap_or_else(|| {
        DEFAULT_CHECKPOINTS
            .iter()
            .map(|name| name.to_string())
            .collect()
    });

    let execution_id = Uuid::new_v4().to_string();
    let execution = state
        .store
        .create_execution(&execution_id, inputs.clone(), checkpoint_names.clone())
        .map_err(|err| match err {
            StoreError::ExecutionExists { .. } => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        })?;

    let executor = Arc::clone(&state.executor);
    tokio::spawn(async move {
        executor
            .execute_with_checkpoints(execution_id, inputs, checkpoint_names)
            .await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "execution_id": execution.execution_id,
            "state": execution.state,
        })),
    ))
}

async fn list_executions(State(state): State<SharedState>) -> impl IntoResponse {
    let mut executions = state.store.list_executions();
    // Active executions first; creation order within each group.
    executions.sort_by_key(|execution| execution.state.is_terminal());
    let executions: Vec<Value> = executions
        .iter()
        .map(|execution| {
            json!({
                "execution_id": execution.execution_id,
                "state": execution.state,
                "current_checkpoint": execution.current_checkpoint,
                "created_at": execution.created_at,
            })
        })
        .collect();
    Json(json!({ "executions": executions }))
}

async fn get_execution(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.get_execution(&id) {
        Some(execution) => Ok(Json(execution)),
        None => Err(ApiError::NotFound(format!("Execution {} not found", id))),
    }
}

async fn pending_checkpoint(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if let Some(checkpoint) = state.store.get_pending_checkpoint(&id) {
        return Ok(Json(checkpoint).into_response());
    }
    match state.store.get_execution(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT.into_response()),
        None => Err(ApiError::NotFound(format!("Execution {} not found", id))),
    }
}

async fn submit_feedback(
    State(state): State<SharedState>,
    Json(req): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let action: FeedbackAction = req.action.parse().map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid action '{}'. Must be one of: continue, stop, revise, skip",
            req.action
        ))
    })?;

    let accepted = state.store.submit_feedback(
        &req.execution_id,
        &req.checkpoint_id,
        action,
        req.feedback.clone(),
    );
    if !accepted {
        return Err(ApiError::NotFound(
            "Checkpoint not found or already resolved".to_string(),
        ));
    }

    // Continue and skip restart the phase loop; revise waits for the next
    // drive to pick the feedback up, and stop ends the run.
    if matches!(action, FeedbackAction::Continue | FeedbackAction::Skip) {
        let executor = Arc::clone(&state.executor);
        let execution_id = req.execution_id.clone();
        tokio::spawn(async move {
            executor.resume_and_commit(execution_id).await;
        });
    }

    Ok(Json(json!({
        "status": "feedback_received",
        "action": action,
        "execution_id": req.execution_id,
        "checkpoint_id": req.checkpoint_id,
    })))
}

async fn cancel_execution(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.store.cancel_execution(&id) {
        return Err(ApiError::NotFound(format!(
            "Execution {} not found or already finished",
            id
        )));
    }
    Ok(Json(json!({ "status": "cancelled", "execution_id": id })))
}

// ── Webhook handlers ──────────────────────────────────────────────────

async fn receive_event(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if state.security.requires_signature() {
        let signature =
            header_str(&headers, SIGNATURE_HEADER).or_else(|| header_str(&headers, SECRET_HEADER));
        let Some(signature) = signature else {
            return Err(ApiError::Unauthorized(
                "Missing webhook signature".to_string(),
            ));
        };
        if !state.security.verify_signature(&body, signature) {
            warn!("Webhook event rejected: signature mismatch");
            return Err(ApiError::Unauthorized(
                "Invalid webhook signature".to_string(),
            ));
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            // Acknowledged so the sender stops redelivering a payload that
            // can never parse.
            debug!(error = %err, "Discarding malformed webhook body");
            return Ok(Json(
                json!({ "received": false, "error": "invalid JSON body" }),
            ));
        }
    };

    let event_type = payload
        .get("event_type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| infer_event_type(&payload).to_string());

    // Ack immediately; processing (with its retry sleeps) runs out of band.
    let processor = Arc::clone(&state.processor);
    let spawned_type = event_type.clone();
    tokio::spawn(async move {
        processor.process_event(&spawned_type, payload).await;
    });

    Ok(Json(json!({ "received": true, "event_type": event_type })))
}

async fn webhook_feedback(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<WebhookFeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state
        .security
        .verify_authorization(header_str(&headers, "authorization"))
    {
        return Err(ApiError::Unauthorized(
            "Invalid or missing API key".to_string(),
        ));
    }
    let action: FeedbackAction = req.action.parse().map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid action '{}'. Must be one of: continue, stop, revise, skip",
            req.action
        ))
    })?;

    let checkpoint = state
        .processor
        .process_feedback(&req.checkpoint_id, action, req.feedback)
        .map_err(|err| match err {
            WebhookError::UnknownCheckpoint { .. } | WebhookError::AlreadyResolved { .. } => {
                ApiError::NotFound(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    Ok(Json(json!({
        "status": "feedback_received",
        "checkpoint_id": checkpoint.checkpoint_id,
        "action": action,
    })))
}

async fn get_webhook_checkpoint(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.processor.get_checkpoint(&id) {
        Some(checkpoint) => Ok(Json(checkpoint)),
        None => Err(ApiError::NotFound(format!("Checkpoint {} not found", id))),
    }
}

async fn get_webhook_execution(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.processor.get_execution(&id) {
        Some(execution) => Ok(Json(execution)),
        None => Err(ApiError::NotFound(format!("Execution {} not found", id))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
