//! Outbound webhook delivery for engine integrations.
//!
//! An engine that runs out-of-process uses this to push `checkpoint.required`
//! (or any other) events at a greenlight-style receiver, signing the exact
//! body bytes so the receiver's signature check passes.

use anyhow::Context;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;

use super::security::{SIGNATURE_HEADER, generate_signature};

/// Delivers signed event payloads to a remote webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
}

impl WebhookSender {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Post one event. The payload is serialized once and the signature is
    /// computed over those exact bytes.
    pub async fn send_event(&self, event_type: &str, payload: &Value) -> anyhow::Result<Value> {
        let body = serde_json::to_vec(payload).context("Failed to serialize webhook payload")?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, generate_signature(&body, secret));
        }

        let response = request
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to deliver '{event_type}' webhook"))?
            .error_for_status()
            .with_context(|| format!("Webhook endpoint rejected '{event_type}' event"))?;

        debug!(event_type, endpoint = %self.endpoint, "Webhook delivered");
        Ok(response.json::<Value>().await.unwrap_or(Value::Null))
    }

    /// Announce a newly created checkpoint to the receiver.
    pub async fn send_checkpoint_required(
        &self,
        checkpoint_id: &str,
        checkpoint_name: &str,
        kickoff_id: &str,
        context: &Value,
    ) -> anyhow::Result<Value> {
        let payload = build_checkpoint_payload(checkpoint_id, checkpoint_name, kickoff_id, context);
        self.send_event("checkpoint.required", &payload).await
    }
}

pub(crate) fn build_checkpoint_payload(
    checkpoint_id: &str,
    checkpoint_name: &str,
    kickoff_id: &str,
    context: &Value,
) -> Value {
    json!({
        "event_type": "checkpoint.required",
        "checkpoint_id": checkpoint_id,
        "checkpoint_name": checkpoint_name,
        "kickoff_id": kickoff_id,
        "context": context,
        "timestamp": Utc::now().to_rfc3339(),
    })
}
