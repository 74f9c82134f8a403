//! Code execution for the room "Run" button.
//!
//! Submitted code is written to a temp file and handed to the configured
//! interpreter. There is no sandbox: the process runs with the server's
//! privileges, bounded only by a wall-clock timeout.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Captured result of one run. Serialized verbatim into `execution_result`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error, or the timeout notice.
    pub stderr: String,
    /// Process exit code; `1` on timeout, `-1` when killed by a signal.
    pub returncode: i32,
}

/// Errors that prevent a run from producing any output.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Temp file could not be created or written.
    #[error("failed to stage code: {0}")]
    Stage(#[source] std::io::Error),
    /// Interpreter could not be started.
    #[error("failed to start {interpreter}: {source}")]
    Spawn {
        /// Interpreter that was invoked.
        interpreter: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// Waiting on the child failed.
    #[error("process wait failed: {0}")]
    Wait(#[source] std::io::Error),
}

/// Something that can run a code buffer and report its output.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Run `code`, feeding `stdin` if given.
    async fn run(&self, code: &str, stdin: Option<&str>) -> Result<ExecutionOutput, ExecutionError>;
}

/// Runs code with a local interpreter process.
#[derive(Clone, Debug)]
pub struct ProcessCodeRunner {
    interpreter: String,
    timeout: Duration,
}

impl ProcessCodeRunner {
    /// Create a runner for `interpreter` with a per-run `timeout`.
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    /// Interpreter command.
    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Output reported when a run exceeds the limit.
    pub fn timeout_output(&self) -> ExecutionOutput {
        ExecutionOutput {
            stdout: String::new(),
            stderr: format!(
                "Error: Code execution timed out ({} limit)",
                describe_limit(self.timeout)
            ),
            returncode: 1,
        }
    }
}

fn describe_limit(limit: Duration) -> String {
    if limit.subsec_millis() == 0 {
        format!("{} seconds", limit.as_secs())
    } else {
        format!("{} ms", limit.as_millis())
    }
}

#[async_trait]
impl CodeRunner for ProcessCodeRunner {
    async fn run(&self, code: &str, stdin: Option<&str>) -> Result<ExecutionOutput, ExecutionError> {
        let start = Instant::now();

        // Removed when dropped, on every return path.
        let script = tempfile::Builder::new()
            .prefix("devsync-")
            .suffix(".py")
            .tempfile()
            .map_err(ExecutionError::Stage)?;
        tokio::fs::write(script.path(), code)
            .await
            .map_err(ExecutionError::Stage)?;

        let mut cmd = tokio::process::Command::new(&self.interpreter);
        let _ = cmd
            .arg(script.path())
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(interpreter = %self.interpreter, bytes = code.len(), "spawning interpreter");

        let mut child = cmd.spawn().map_err(|source| ExecutionError::Spawn {
            interpreter: self.interpreter.clone(),
            source,
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            let input = input.to_owned();
            // A script that never reads stdin closes the pipe early; that is not an error.
            let _ = tokio::spawn(async move {
                let _ = pipe.write_all(input.as_bytes()).await;
            });
        }

        let output = tokio::select! {
            result = child.wait_with_output() => result.map_err(ExecutionError::Wait)?,
            () = tokio::time::sleep(self.timeout) => {
                warn!(interpreter = %self.interpreter, timeout_ms = self.timeout.as_millis(), "execution timed out");
                return Ok(self.timeout_output());
            }
        };

        let returncode = output.status.code().unwrap_or(-1);
        debug!(
            returncode,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "execution completed"
        );

        Ok(ExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            returncode,
        })
    }
}
