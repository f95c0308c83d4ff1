//! Workflow engine abstraction and the subprocess adapter.
//!
//! The orchestrator treats the engine as opaque: it hands over a phase name
//! plus the accumulated inputs and gets back a structured outcome. The
//! bundled [`CommandEngine`] runs an external command per phase, feeding the
//! request as JSON on stdin and reading the outcome from stdout.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use tokio::process::Command;

use crate::errors::EngineError;

/// Capability for engine-returned items that can name themselves in
/// reviewer-facing context.
pub trait Labeled {
    fn display_name(&self) -> &str;
}

/// One phase invocation: the phase name and the inputs accumulated so far.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseRequest {
    pub phase: String,
    pub inputs: Map<String, Value>,
}

/// Output of one task within a phase, for engines that report them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    #[serde(default, alias = "name", alias = "task_id")]
    pub label: String,
    #[serde(default)]
    pub output: Value,
}

impl Labeled for TaskOutput {
    fn display_name(&self) -> &str {
        if self.label.is_empty() { "task" } else { &self.label }
    }
}

/// Structured result of a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutcome {
    /// Engine-reported status; engines that do not report one are assumed
    /// to have completed.
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub task_outputs: Vec<TaskOutput>,
}

fn default_status() -> String {
    "complete".to_string()
}

impl Default for PhaseOutcome {
    fn default() -> Self {
        Self {
            status: default_status(),
            output: Value::Null,
            task_outputs: Vec::new(),
        }
    }
}

impl PhaseOutcome {
    pub fn with_output(output: Value) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    /// Digest of this outcome for checkpoint context: the phase, the
    /// status, a bounded preview of the output, and task labels. Bounding
    /// the preview keeps checkpoint records small no matter how chatty the
    /// engine is.
    pub fn context_digest(&self, phase: &str, preview_limit: usize) -> Value {
        let preview = match &self.output {
            Value::String(text) => truncate_preview(text, preview_limit),
            Value::Null => String::new(),
            other => truncate_preview(&other.to_string(), preview_limit),
        };
        let tasks: Vec<&str> = self
            .task_outputs
            .iter()
            .map(|task| task.display_name())
            .collect();
        json!({
            "phase": phase,
            "status": self.status,
            "result_preview": preview,
            "tasks": tasks,
        })
    }
}

/// Truncate reviewer-facing text on a character boundary.
pub fn truncate_preview(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let truncated: String = text.chars().take(limit).collect();
    format!("{}...", truncated)
}

/// An opaque execution engine that can run one named phase.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn run_phase(&self, request: PhaseRequest) -> Result<PhaseOutcome, EngineError>;
}

/// Engine adapter that shells out to an external command per phase.
///
/// The request is written to the child's stdin as a single JSON object;
/// the outcome is read from stdout. The child may log freely on stdout as
/// long as its final JSON object line is the outcome.
pub struct CommandEngine {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandEngine {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
        }
    }

    /// Parse a whitespace-separated command line, e.g. `"crew run --json"`.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let command = parts.next()?;
        Some(Self {
            command,
            args: parts.collect(),
            working_dir: None,
        })
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl WorkflowEngine for CommandEngine {
    async fn run_phase(&self, request: PhaseRequest) -> Result<PhaseOutcome, EngineError> {
        let payload =
            serde_json::to_vec(&request).context("Failed to serialize phase request")?;

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::SpawnFailed {
                command: self.command.clone(),
                source,
            })?;

        // Write the request to stdin and close it so the child sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            stdin
                .write_all(&payload)
                .await
                .context("Failed to write phase request to engine stdin")?;
            stdin
                .shutdown()
                .await
                .context("Failed to close engine stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to collect engine output")?;

        if !output.status.success() {
            return Err(EngineError::NonZeroExit {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_outcome(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Interpret engine stdout as a [`PhaseOutcome`].
///
/// Tried in order: the whole output as JSON, then each line from the end
/// for the last JSON object, then the raw text as the output itself.
fn parse_outcome(stdout: &str) -> Result<PhaseOutcome, EngineError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidOutput(
            "engine produced no output".to_string(),
        ));
    }
    if let Some(outcome) = outcome_from_json(trimmed) {
        return Ok(outcome);
    }
    for line in trimmed.lines().rev() {
        let line = line.trim();
        if line.starts_with('{')
            && let Some(outcome) = outcome_from_json(line)
        {
            return Ok(outcome);
        }
    }
    Ok(PhaseOutcome::with_output(Value::String(trimmed.to_string())))
}

fn outcome_from_json(text: &str) -> Option<PhaseOutcome> {
    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    let looks_like_outcome = object.contains_key("status")
        || object.contains_key("output")
        || object.contains_key("task_outputs");
    if looks_like_outcome {
        serde_json::from_value(value).ok()
    } else {
        // An object with none of the outcome fields is itself the output.
        Some(PhaseOutcome::with_output(value))
    }
}

/// Placeholder engine used when no command is configured; every phase
/// invocation fails with a pointer at the missing configuration.
pub struct UnconfiguredEngine;

#[async_trait]
impl WorkflowEngine for UnconfiguredEngine {
    async fn run_phase(&self, request: PhaseRequest) -> Result<PhaseOutcome, EngineError> {
        Err(EngineError::Other(anyhow::anyhow!(
            "No engine command configured; set GREENLIGHT_ENGINE_CMD before running phase '{}'",
            request.phase
        )))
    }
}

// =========================================
// Tests
// =========================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_preview() {
        assert_eq!(truncate_preview("short", 10), "short");
        assert_eq!(truncate_preview("abcdefghij", 10), "abcdefghij");
        assert_eq!(truncate_preview("abcdefghijk", 10), "abcdefghij...");
        // Multibyte text truncates on a character boundary.
        assert_eq!(truncate_preview("héllo wörld", 4), "héll...");
    }

    #[test]
    fn test_context_digest_previews_output() {
        let outcome = PhaseOutcome {
            status: "complete".to_string(),
            output: Value::String("x".repeat(600)),
            task_outputs: vec![
                TaskOutput {
                    label: "research".to_string(),
                    output: json!("findings"),
                },
                TaskOutput {
                    label: String::new(),
                    output: json!(null),
                },
            ],
        };
        let digest = outcome.context_digest("planning", 500);
        assert_eq!(digest["phase"], "planning");
        assert_eq!(digest["status"], "complete");
        assert_eq!(digest["result_preview"].as_str().unwrap().len(), 503);
        assert_eq!(digest["tasks"], json!(["research", "task"]));
    }

    #[test]
    fn test_parse_outcome_structured() {
        let outcome =
            parse_outcome(r#"{"status": "complete", "output": "plan ready"}"#).unwrap();
        assert_eq!(outcome.status, "complete");
        assert_eq!(outcome.output, json!("plan ready"));
    }

    #[test]
    fn test_parse_outcome_takes_last_json_line() {
        let stdout = "starting up\nworking...\n{\"output\": \"done\"}\n";
        let outcome = parse_outcome(stdout).unwrap();
        assert_eq!(outcome.output, json!("done"));
        assert_eq!(outcome.status, "complete");
    }

    #[test]
    fn test_parse_outcome_wraps_plain_object() {
        let outcome = parse_outcome(r#"{"answer": 42}"#).unwrap();
        assert_eq!(outcome.output, json!({"answer": 42}));
    }

    #[test]
    fn test_parse_outcome_accepts_plain_text() {
        let outcome = parse_outcome("just some prose\n").unwrap();
        assert_eq!(outcome.output, json!("just some prose"));
    }

    #[test]
    fn test_parse_outcome_rejects_empty() {
        assert!(matches!(
            parse_outcome("   \n"),
            Err(EngineError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_from_command_line() {
        let engine = CommandEngine::from_command_line("crew run --json").unwrap();
        assert_eq!(engine.command, "crew");
        assert_eq!(engine.args, vec!["run".to_string(), "--json".to_string()]);
        assert!(CommandEngine::from_command_line("   ").is_none());
    }

    fn request(phase: &str) -> PhaseRequest {
        let mut inputs = Map::new();
        inputs.insert("topic".to_string(), json!("pricing"));
        PhaseRequest {
            phase: phase.to_string(),
            inputs,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_engine_round_trip() {
        let engine = CommandEngine::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"cat >/dev/null; echo '{"status":"complete","output":"phase done"}'"#.to_string(),
            ],
        );
        let outcome = engine.run_phase(request("planning")).await.unwrap();
        assert_eq!(outcome.status, "complete");
        assert_eq!(outcome.output, json!("phase done"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_engine_runs_in_working_dir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("engine.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\ncat > request.json\necho '{\"output\":\"ran in scratch dir\"}'\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let engine =
            CommandEngine::new(script.to_string_lossy(), vec![]).with_working_dir(dir.path());
        let outcome = engine.run_phase(request("planning")).await.unwrap();
        assert_eq!(outcome.output, json!("ran in scratch dir"));

        // The child ran in the configured directory and saw the full request.
        let captured = std::fs::read_to_string(dir.path().join("request.json")).unwrap();
        let recorded: Value = serde_json::from_str(&captured).unwrap();
        assert_eq!(recorded["phase"], "planning");
        assert_eq!(recorded["inputs"]["topic"], "pricing");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_engine_nonzero_exit() {
        let engine = CommandEngine::new(
            "sh",
            vec![
                "-c".to_string(),
                "cat >/dev/null; echo boom >&2; exit 3".to_string(),
            ],
        );
        let err = engine.run_phase(request("planning")).await.unwrap_err();
        match err {
            EngineError::NonZeroExit { exit_code, stderr } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("Expected NonZeroExit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_command_engine_spawn_failure() {
        let engine = CommandEngine::new("greenlight-no-such-engine-binary", vec![]);
        let err = engine.run_phase(request("planning")).await.unwrap_err();
        assert!(matches!(err, EngineError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_engine_names_the_fix() {
        let err = UnconfiguredEngine
            .run_phase(request("planning"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GREENLIGHT_ENGINE_CMD"));
    }
}
