//! Phase-by-phase workflow execution with human checkpoints.
//!
//! [`PhasedExecutor`] owns the run/suspend/resume loop; [`WorkflowEngine`]
//! is the seam to whatever actually computes a phase.

pub mod engine;
pub mod runner;

pub use engine::{
    CommandEngine, Labeled, PhaseOutcome, PhaseRequest, TaskOutput, UnconfiguredEngine,
    WorkflowEngine, truncate_preview,
};
pub use runner::{ExecutorConfig, PhasedExecutor, RunOutcome, TERMINAL_PHASE, phase_label};
