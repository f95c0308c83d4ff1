//! The phased executor: drives an execution through its checkpoints.
//!
//! One cooperative task per in-flight execution. The task runs a phase,
//! records a checkpoint, then suspends on the store's change signal until a
//! human resolves it, the execution is cancelled, or the feedback timeout
//! elapses. Suspension holds no locks, so a slow engine or an absent
//! reviewer only ever stalls its own execution.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use crate::config::{Config, DEFAULT_FEEDBACK_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS};
use crate::errors::ExecutorError;
use crate::store::{CheckpointFeedback, CheckpointStore, ExecutionState, FeedbackAction};

use super::engine::{PhaseOutcome, PhaseRequest, WorkflowEngine};

/// Character cap for output previews folded into checkpoint context.
pub const DEFAULT_PREVIEW_LIMIT: usize = 500;

/// Name of the implicit terminal phase run after the checkpoint loop.
pub const TERMINAL_PHASE: &str = "final";

/// Phase a checkpoint reviews, by the `after_<phase>` naming convention.
/// Names without the prefix are their own phase.
pub fn phase_label(checkpoint_name: &str) -> &str {
    checkpoint_name
        .strip_prefix("after_")
        .unwrap_or(checkpoint_name)
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound between suspension re-checks; the store's change signal
    /// usually wakes the executor much sooner.
    pub poll_interval: Duration,
    /// Wall-clock limit for a checkpoint to stay unresolved.
    pub feedback_timeout: Duration,
    pub preview_limit: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            feedback_timeout: Duration::from_secs(DEFAULT_FEEDBACK_TIMEOUT_SECS),
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

impl ExecutorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            feedback_timeout: config.feedback_timeout,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_feedback_timeout(mut self, timeout: Duration) -> Self {
        self.feedback_timeout = timeout;
        self
    }
}

/// How a drive through the checkpoint loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every phase ran; carries the final result.
    Completed(Value),
    /// A reviewer chose `stop`; carries the partial result.
    Stopped { phase: String, result: Value },
}

/// Drives executions phase by phase, pausing at checkpoints.
pub struct PhasedExecutor {
    store: Arc<CheckpointStore>,
    engine: Arc<dyn WorkflowEngine>,
    config: ExecutorConfig,
    /// Executions currently being driven by a task in this process. Guards
    /// against the same execution being driven twice concurrently, e.g. a
    /// resume request racing an executor that never released its claim.
    in_flight: Mutex<HashSet<String>>,
}

/// Releases the in-flight claim when the driving task finishes, even if it
/// unwinds.
struct InFlightGuard<'a> {
    executor: &'a PhasedExecutor,
    execution_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.executor.in_flight.lock() {
            in_flight.remove(&self.execution_id);
        }
    }
}

impl PhasedExecutor {
    pub fn new(
        store: Arc<CheckpointStore>,
        engine: Arc<dyn WorkflowEngine>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            engine,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn try_claim(&self, execution_id: &str) -> Option<InFlightGuard<'_>> {
        let Ok(mut in_flight) = self.in_flight.lock() else {
            return None;
        };
        if !in_flight.insert(execution_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            executor: self,
            execution_id: execution_id.to_string(),
        })
    }

    /// Drive a registered execution through all of its phases from the
    /// start.
    pub async fn run(
        &self,
        execution_id: &str,
        inputs: Value,
        checkpoint_names: Vec<String>,
    ) -> Result<RunOutcome, ExecutorError> {
        let _guard = self
            .try_claim(execution_id)
            .ok_or_else(|| ExecutorError::AlreadyInFlight {
                id: execution_id.to_string(),
            })?;
        if self.store.get_execution(execution_id).is_none() {
            return Err(ExecutorError::ExecutionNotFound {
                id: execution_id.to_string(),
            });
        }

        self.store
            .update_execution_state(execution_id, ExecutionState::Running, None, None);
        info!(
            execution_id,
            checkpoints = checkpoint_names.len(),
            "Execution started"
        );
        self.drive(execution_id, as_input_map(&inputs), checkpoint_names)
            .await
    }

    /// Continue a suspended execution from its first unfinished checkpoint.
    ///
    /// Returns `Ok(None)` without doing anything when the execution is
    /// already being driven in this process (its own executor will observe
    /// the feedback) or is not in a resumable state.
    pub async fn resume(&self, execution_id: &str) -> Result<Option<RunOutcome>, ExecutorError> {
        let Some(_guard) = self.try_claim(execution_id) else {
            debug!(execution_id, "Resume skipped: execution already being driven");
            return Ok(None);
        };
        let Some(execution) = self.store.get_execution(execution_id) else {
            warn!(execution_id, "Resume requested for unknown execution");
            return Err(ExecutorError::ExecutionNotFound {
                id: execution_id.to_string(),
            });
        };
        if execution.state != ExecutionState::Running {
            debug!(
                execution_id,
                state = %execution.state,
                "Resume skipped: execution not in a resumable state"
            );
            return Ok(None);
        }

        // Map resolved checkpoint ids back to names to compute what is
        // left to run.
        let completed: HashSet<String> = execution
            .completed_checkpoints
            .iter()
            .filter_map(|checkpoint_id| self.store.get_checkpoint(checkpoint_id))
            .map(|checkpoint| checkpoint.name)
            .collect();
        let remaining: Vec<String> = execution
            .checkpoint_names
            .iter()
            .filter(|name| !completed.contains(*name))
            .cloned()
            .collect();

        let mut inputs = as_input_map(&execution.inputs);
        // A revision resolved while nothing was driving has not been folded
        // yet; attach it before continuing.
        if let Some(last_id) = execution.completed_checkpoints.last()
            && let Some(checkpoint) = self.store.get_checkpoint(last_id)
            && checkpoint.action == Some(FeedbackAction::Revise)
            && let Some(text) = checkpoint.feedback_text.clone()
        {
            inputs.insert(
                format!("{}_feedback", phase_label(&checkpoint.name)),
                Value::String(text),
            );
        }

        info!(
            execution_id,
            remaining = remaining.len(),
            "Resuming execution"
        );
        self.drive(execution_id, inputs, remaining).await.map(Some)
    }

    /// Run an execution end to end and commit the outcome to the store.
    /// This is the fire-and-forget entry point the API layer spawns right
    /// after registering an execution.
    pub async fn execute_with_checkpoints(
        &self,
        execution_id: String,
        inputs: Value,
        checkpoint_names: Vec<String>,
    ) {
        let outcome = self.run(&execution_id, inputs, checkpoint_names).await;
        self.commit_outcome(&execution_id, outcome);
    }

    /// Resume an execution and commit the outcome, for spawning off a
    /// feedback submission.
    pub async fn resume_and_commit(&self, execution_id: String) {
        match self.resume(&execution_id).await {
            Ok(None) => {}
            Ok(Some(outcome)) => self.commit_outcome(&execution_id, Ok(outcome)),
            Err(err) => self.commit_outcome(&execution_id, Err(err)),
        }
    }

    /// The checkpoint loop: run each phase, pause for feedback, fold the
    /// results forward, then run the terminal phase.
    async fn drive(
        &self,
        execution_id: &str,
        mut inputs: Map<String, Value>,
        checkpoint_names: Vec<String>,
    ) -> Result<RunOutcome, ExecutorError> {
        for name in &checkpoint_names {
            let phase = phase_label(name);
            let outcome = self.run_phase(execution_id, phase, &inputs).await?;

            let context = outcome.context_digest(phase, self.config.preview_limit);
            let checkpoint = self.store.create_checkpoint(
                execution_id,
                name,
                &format!("Review the {} phase output", phase),
                context,
            );
            info!(
                execution_id,
                checkpoint_id = %checkpoint.checkpoint_id,
                name = %name,
                "Checkpoint created; waiting for feedback"
            );

            let feedback = self
                .wait_for_feedback(execution_id, &checkpoint.checkpoint_id, name)
                .await?;

            if feedback.action == FeedbackAction::Stop {
                info!(execution_id, phase, "Execution stopped by reviewer");
                let result = json!({
                    "status": "stopped",
                    "stopped_at": name,
                    "phase": phase,
                    "feedback": feedback.feedback_text,
                });
                return Ok(RunOutcome::Stopped {
                    phase: phase.to_string(),
                    result,
                });
            }

            // Later phases see earlier results through the folded inputs.
            inputs.insert(format!("{}_output", phase), outcome.output.clone());
            if feedback.action == FeedbackAction::Revise
                && let Some(text) = &feedback.feedback_text
            {
                inputs.insert(format!("{}_feedback", phase), Value::String(text.clone()));
            }
            self.store
                .update_inputs(execution_id, Value::Object(inputs.clone()));
        }

        // Terminal phase: nothing gates the end of the run.
        let outcome = self
            .run_phase(execution_id, TERMINAL_PHASE, &inputs)
            .await?;
        Ok(RunOutcome::Completed(json!({
            "status": "complete",
            "output": outcome.output,
            "task_outputs": outcome.task_outputs,
        })))
    }

    async fn run_phase(
        &self,
        execution_id: &str,
        phase: &str,
        inputs: &Map<String, Value>,
    ) -> Result<PhaseOutcome, ExecutorError> {
        debug!(execution_id, phase, "Invoking engine");
        let request = PhaseRequest {
            phase: phase.to_string(),
            inputs: inputs.clone(),
        };
        self.engine
            .run_phase(request)
            .await
            .map_err(|err| ExecutorError::Engine {
                phase: phase.to_string(),
                message: err.to_string(),
            })
    }

    /// Suspend until the checkpoint resolves, the execution is cancelled,
    /// or the feedback timeout elapses. Sleeps on the store's change signal
    /// between checks; no lock is held while waiting.
    async fn wait_for_feedback(
        &self,
        execution_id: &str,
        checkpoint_id: &str,
        name: &str,
    ) -> Result<CheckpointFeedback, ExecutorError> {
        let deadline = tokio::time::Instant::now() + self.config.feedback_timeout;
        loop {
            let Some(execution) = self.store.get_execution(execution_id) else {
                return Err(ExecutorError::ExecutionNotFound {
                    id: execution_id.to_string(),
                });
            };
            if execution.state == ExecutionState::Cancelled {
                return Err(ExecutorError::Cancelled {
                    id: execution_id.to_string(),
                });
            }
            if let Some(feedback) = self.store.checkpoint_feedback(checkpoint_id) {
                debug!(
                    execution_id,
                    checkpoint_id,
                    action = %feedback.action,
                    "Checkpoint resolved"
                );
                return Ok(feedback);
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ExecutorError::FeedbackTimeout {
                    name: name.to_string(),
                    waited: self.config.feedback_timeout,
                });
            }
            self.store
                .wait_for_change(remaining.min(self.config.poll_interval))
                .await;
        }
    }

    fn commit_outcome(&self, execution_id: &str, outcome: Result<RunOutcome, ExecutorError>) {
        match outcome {
            Ok(RunOutcome::Completed(result)) => {
                self.store.update_execution_state(
                    execution_id,
                    ExecutionState::Completed,
                    Some(result),
                    None,
                );
                info!(execution_id, "Execution completed");
            }
            Ok(RunOutcome::Stopped { phase, result }) => {
                // Feedback already moved the execution to STOPPED; this
                // write attaches the partial result.
                self.store.update_execution_state(
                    execution_id,
                    ExecutionState::Stopped,
                    Some(result),
                    None,
                );
                info!(execution_id, phase = %phase, "Execution stopped");
            }
            Err(ExecutorError::Cancelled { .. }) => {
                // Cancellation already wrote the terminal state.
                info!(execution_id, "Execution cancelled");
            }
            Err(ExecutorError::AlreadyInFlight { .. }) => {
                warn!(execution_id, "Duplicate drive attempt ignored");
            }
            Err(err) => {
                error!(execution_id, error = %err, "Execution failed");
                self.store.update_execution_state(
                    execution_id,
                    ExecutionState::Error,
                    None,
                    Some(err.to_string()),
                );
            }
        }
    }
}

fn as_input_map(inputs: &Value) -> Map<String, Value> {
    match inputs {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".to_string(), other.clone());
            map
        }
    }
}

// =========================================
// Tests
// =========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use crate::store::Checkpoint;
    use async_trait::async_trait;

    #[derive(Default)]
    struct MockEngine {
        requests: Mutex<Vec<PhaseRequest>>,
    }

    impl MockEngine {
        fn phases(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|request| request.phase.clone())
                .collect()
        }
    }

    #[async_trait]
    impl WorkflowEngine for MockEngine {
        async fn run_phase(&self, request: PhaseRequest) -> Result<PhaseOutcome, EngineError> {
            let phase = request.phase.clone();
            self.requests.lock().unwrap().push(request);
            Ok(PhaseOutcome::with_output(json!(format!(
                "{phase} output"
            ))))
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl WorkflowEngine for FailingEngine {
        async fn run_phase(&self, _request: PhaseRequest) -> Result<PhaseOutcome, EngineError> {
            Err(EngineError::InvalidOutput("scripted failure".to_string()))
        }
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_feedback_timeout(Duration::from_secs(2))
    }

    fn harness(
        engine: Arc<dyn WorkflowEngine>,
        config: ExecutorConfig,
    ) -> (Arc<CheckpointStore>, Arc<PhasedExecutor>) {
        let store = Arc::new(CheckpointStore::new());
        let executor = Arc::new(PhasedExecutor::new(Arc::clone(&store), engine, config));
        (store, executor)
    }

    async fn wait_for_pending(store: &CheckpointStore, execution_id: &str) -> Checkpoint {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(checkpoint) = store.get_pending_checkpoint(execution_id) {
                return checkpoint;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "no pending checkpoint appeared for {execution_id}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn spawn_execute(
        executor: &Arc<PhasedExecutor>,
        execution_id: &str,
        inputs: Value,
        names: &[&str],
    ) -> tokio::task::JoinHandle<()> {
        let executor = Arc::clone(executor);
        let execution_id = execution_id.to_string();
        let names: Vec<String> = names.iter().map(|name| name.to_string()).collect();
        tokio::spawn(async move {
            executor
                .execute_with_checkpoints(execution_id, inputs, names)
                .await;
        })
    }

    #[test]
    fn test_phase_label() {
        assert_eq!(phase_label("after_planning"), "planning");
        assert_eq!(phase_label("c1"), "c1");
    }

    #[tokio::test]
    async fn test_run_completes_through_checkpoints() {
        let engine = Arc::new(MockEngine::default());
        let (store, executor) = harness(engine.clone(), fast_config());
        store
            .create_execution(
                "exec-1",
                json!({"topic": "pricing"}),
                vec!["after_planning".to_string()],
            )
            .unwrap();

        let handle = spawn_execute(
            &executor,
            "exec-1",
            json!({"topic": "pricing"}),
            &["after_planning"],
        );

        let checkpoint = wait_for_pending(&store, "exec-1").await;
        assert_eq!(checkpoint.name, "after_planning");
        assert_eq!(checkpoint.context["phase"], "planning");
        assert!(store.submit_feedback(
            "exec-1",
            &checkpoint.checkpoint_id,
            FeedbackAction::Continue,
            None,
        ));

        handle.await.unwrap();
        let execution = store.get_execution("exec-1").unwrap();
        assert_eq!(execution.state, ExecutionState::Completed);
        let result = execution.result.unwrap();
        assert_eq!(result["status"], "complete");
        assert_eq!(result["output"], "final output");
        assert_eq!(engine.phases(), vec!["planning", "final"]);
    }

    #[tokio::test]
    async fn test_stop_halts_before_later_checkpoints() {
        let engine = Arc::new(MockEngine::default());
        let (store, executor) = harness(engine.clone(), fast_config());
        store
            .create_execution(
                "exec-2",
                json!({}),
                vec!["c1".to_string(), "c2".to_string()],
            )
            .unwrap();

        let handle = spawn_execute(&executor, "exec-2", json!({}), &["c1", "c2"]);

        let checkpoint = wait_for_pending(&store, "exec-2").await;
        assert_eq!(checkpoint.name, "c1");
        assert!(store.submit_feedback(
            "exec-2",
            &checkpoint.checkpoint_id,
            FeedbackAction::Stop,
            Some("not worth continuing".to_string()),
        ));

        handle.await.unwrap();
        let execution = store.get_execution("exec-2").unwrap();
        assert_eq!(execution.state, ExecutionState::Stopped);
        assert_eq!(execution.completed_checkpoints, vec![checkpoint.checkpoint_id]);
        let result = execution.result.unwrap();
        assert_eq!(result["status"], "stopped");
        assert_eq!(result["stopped_at"], "c1");
        // c2 was never reached: no phase ran for it and no checkpoint exists.
        assert_eq!(engine.phases(), vec!["c1"]);
        assert!(store.list_pending_checkpoints().is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_checkpoint_times_out() {
        let engine = Arc::new(MockEngine::default());
        let config = ExecutorConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_feedback_timeout(Duration::from_millis(50));
        let (store, executor) = harness(engine, config);
        store
            .create_execution("exec-3", json!({}), vec!["after_planning".to_string()])
            .unwrap();

        let handle = spawn_execute(&executor, "exec-3", json!({}), &["after_planning"]);
        handle.await.unwrap();

        let execution = store.get_execution("exec-3").unwrap();
        assert_eq!(execution.state, ExecutionState::Error);
        let error = execution.error.unwrap();
        assert!(
            error.contains("after_planning"),
            "timeout error should name the checkpoint: {error}"
        );
        assert!(error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancel_aborts_waiting_execution() {
        let engine = Arc::new(MockEngine::default());
        let (store, executor) = harness(engine, fast_config());
        store
            .create_execution("exec-4", json!({}), vec!["c1".to_string()])
            .unwrap();

        let handle = spawn_execute(&executor, "exec-4", json!({}), &["c1"]);
        wait_for_pending(&store, "exec-4").await;
        assert!(store.cancel_execution("exec-4"));

        handle.await.unwrap();
        let execution = store.get_execution("exec-4").unwrap();
        assert_eq!(execution.state, ExecutionState::Cancelled);
        assert!(execution.error.is_none());
    }

    #[tokio::test]
    async fn test_resume_runs_only_remaining_checkpoints() {
        let engine = Arc::new(MockEngine::default());
        let (store, executor) = harness(engine.clone(), fast_config());
        store
            .create_execution(
                "exec-5",
                json!({"topic": "pricing"}),
                vec!["c1".to_string(), "c2".to_string()],
            )
            .unwrap();

        // Simulate earlier progress: c1 was checkpointed and approved while
        // no executor task was driving.
        store.update_execution_state("exec-5", ExecutionState::Running, None, None);
        let first = store.create_checkpoint("exec-5", "c1", "review", json!({}));
        assert!(store.submit_feedback(
            "exec-5",
            &first.checkpoint_id,
            FeedbackAction::Continue,
            None,
        ));

        let handle = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.resume_and_commit("exec-5".to_string()).await })
        };

        // Exactly one new checkpoint appears, for c2, never c1 again.
        let second = wait_for_pending(&store, "exec-5").await;
        assert_eq!(second.name, "c2");
        assert!(store.submit_feedback(
            "exec-5",
            &second.checkpoint_id,
            FeedbackAction::Continue,
            None,
        ));

        handle.await.unwrap();
        let execution = store.get_execution("exec-5").unwrap();
        assert_eq!(execution.state, ExecutionState::Completed);
        assert_eq!(
            execution.completed_checkpoints,
            vec![first.checkpoint_id, second.checkpoint_id]
        );
        assert_eq!(engine.phases(), vec!["c2", "final"]);
    }

    #[tokio::test]
    async fn test_revise_feedback_reaches_next_phase() {
        let engine = Arc::new(MockEngine::default());
        let (store, executor) = harness(engine.clone(), fast_config());
        store
            .create_execution("exec-6", json!({"topic": "x"}), vec!["after_planning".to_string()])
            .unwrap();

        let handle = spawn_execute(
            &executor,
            "exec-6",
            json!({"topic": "x"}),
            &["after_planning"],
        );
        let checkpoint = wait_for_pending(&store, "exec-6").await;
        assert!(store.submit_feedback(
            "exec-6",
            &checkpoint.checkpoint_id,
            FeedbackAction::Revise,
            Some("add a competitor section".to_string()),
        ));
        handle.await.unwrap();

        let requests = engine.requests.lock().unwrap();
        let final_request = requests
            .iter()
            .find(|request| request.phase == TERMINAL_PHASE)
            .expect("terminal phase should have run");
        assert_eq!(
            final_request.inputs["planning_feedback"],
            json!("add a competitor section")
        );
        assert_eq!(final_request.inputs["planning_output"], json!("planning output"));
        assert_eq!(final_request.inputs["topic"], json!("x"));
    }

    #[tokio::test]
    async fn test_resume_folds_unfolded_revision() {
        let engine = Arc::new(MockEngine::default());
        let (store, executor) = harness(engine.clone(), fast_config());
        store
            .create_execution("exec-7", json!({}), vec!["c1".to_string()])
            .unwrap();
        store.update_execution_state("exec-7", ExecutionState::Running, None, None);
        let checkpoint = store.create_checkpoint("exec-7", "c1", "review", json!({}));
        assert!(store.submit_feedback(
            "exec-7",
            &checkpoint.checkpoint_id,
            FeedbackAction::Revise,
            Some("tighten scope".to_string()),
        ));

        let outcome = executor.resume("exec-7").await.unwrap();
        assert!(matches!(outcome, Some(RunOutcome::Completed(_))));
        let requests = engine.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].phase, TERMINAL_PHASE);
        assert_eq!(requests[0].inputs["c1_feedback"], json!("tighten scope"));
    }

    #[tokio::test]
    async fn test_concurrent_drive_is_rejected() {
        let (store, executor) = harness(Arc::new(MockEngine::default()), fast_config());
        store
            .create_execution("exec-8", json!({}), vec!["c1".to_string()])
            .unwrap();

        let _claim = executor.try_claim("exec-8").unwrap();
        let err = executor
            .run("exec-8", json!({}), vec!["c1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::AlreadyInFlight { .. }));

        // A resume request quietly declines instead of erroring.
        let outcome = executor.resume("exec-8").await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_run_unknown_execution() {
        let (_store, executor) = harness(Arc::new(MockEngine::default()), fast_config());
        let err = executor
            .run("ghost", json!({}), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::ExecutionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_engine_failure_marks_execution_error() {
        let (store, executor) = harness(Arc::new(FailingEngine), fast_config());
        store
            .create_execution("exec-9", json!({}), vec!["c1".to_string()])
            .unwrap();

        executor
            .execute_with_checkpoints("exec-9".to_string(), json!({}), vec!["c1".to_string()])
            .await;
        let execution = store.get_execution("exec-9").unwrap();
        assert_eq!(execution.state, ExecutionState::Error);
        let error = execution.error.unwrap();
        assert!(error.contains("c1"));
        assert!(error.contains("scripted failure"));
    }

    #[tokio::test]
    async fn test_resume_skips_non_resumable_states() {
        let (store, executor) = harness(Arc::new(MockEngine::default()), fast_config());
        store
            .create_execution("exec-10", json!({}), vec!["c1".to_string()])
            .unwrap();

        // Pending: nothing resolved yet, resume has nothing to do.
        assert!(executor.resume("exec-10").await.unwrap().is_none());

        store.cancel_execution("exec-10");
        assert!(executor.resume("exec-10").await.unwrap().is_none());
    }
}
