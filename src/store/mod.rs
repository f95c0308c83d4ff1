//! Authoritative state for executions and their checkpoints.
//!
//! The store is the single owner of all execution and checkpoint records;
//! everything else in the crate observes them or submits feedback through
//! its operations. Swapping the in-memory maps for a durable table later
//! only touches this module.

pub mod store;
pub mod types;

pub use store::CheckpointStore;
pub use types::{
    Checkpoint, CheckpointFeedback, CheckpointStatus, Execution, ExecutionState, FeedbackAction,
    is_valid_transition,
};
