use crate::error::ExecutionError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// What running one generated code block produced. Never carries a Rust
/// `Result`-style failure for an in-code exception — stderr and a non-zero
/// `exit_status` are how that's represented, since an exception inside
/// generated code is an observation, not a fault (spec §9).
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
    pub final_value_text: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }

    /// Short text fed back to the model describing this execution,
    /// exceptions included (the "observation" of spec.md's glossary).
    pub fn as_observation(&self) -> String {
        if self.succeeded() {
            match &self.final_value_text {
                Some(v) => format!("Execution succeeded. Final value: {v}\nstdout:\n{}", self.stdout),
                None => format!("Execution succeeded.\nstdout:\n{}", self.stdout),
            }
        } else {
            format!(
                "Execution failed (exit status {}).\nstderr:\n{}",
                self.exit_status, self.stderr
            )
        }
    }
}

/// Runs one generated code block to completion or until `budget` elapses.
/// Production implementations never embed an interpreter in-process — code
/// always runs as an explicit subprocess whose lifetime the Orchestrator
/// owns (spec §9's re-architecture note).
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, code: &str, budget: Duration) -> Result<ExecutionOutcome, ExecutionError>;
}

/// Pipes `code` to a configured interpreter binary's stdin and captures its
/// stdout/stderr/exit status. The interpreter is expected to print the
/// value of the final expression as the last line of stdout; that
/// convention is the executor's contract with whatever script the operator
/// configures, not a property of any one source language.
pub struct SubprocessCodeExecutor {
    interpreter_command: String,
    interpreter_args: Vec<String>,
}

impl SubprocessCodeExecutor {
    pub fn new(interpreter_command: impl Into<String>, interpreter_args: Vec<String>) -> Self {
        Self {
            interpreter_command: interpreter_command.into(),
            interpreter_args,
        }
    }
}

#[async_trait]
impl CodeExecutor for SubprocessCodeExecutor {
    async fn execute(&self, code: &str, budget: Duration) -> Result<ExecutionOutcome, ExecutionError> {
        let mut child = Command::new(&self.interpreter_command)
            .args(&self.interpreter_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| ExecutionError::Io(e.to_string()))?;
        }

        let output = match tokio::time::timeout(budget, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ExecutionError::Io(e.to_string()))?,
            Err(_) => {
                // `wait_with_output` consumed `child`, so there's nothing left to
                // kill by handle; `kill_on_drop` reaps the orphaned process as the
                // future above is dropped here.
                return Err(ExecutionError::Timeout);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let final_value_text = stdout.lines().last().filter(|l| !l.trim().is_empty()).map(|l| l.to_string());

        Ok(ExecutionOutcome {
            stdout,
            stderr,
            exit_status: output.status.code().unwrap_or(-1),
            final_value_text,
        })
    }
}
