//! Webhook transport: signed event ingestion, processing, and delivery.

pub mod events;
pub mod processor;
pub mod security;
pub mod sender;

pub use events::{
    EventKind, EventRecord, EventStatus, TaskResult, WebhookExecution, infer_event_type,
};
pub use processor::{ProcessorConfig, ProcessorStats, WebhookProcessor};
pub use security::{WebhookSecurity, generate_signature, verify_signature};
pub use sender::WebhookSender;
