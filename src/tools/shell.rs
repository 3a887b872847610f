// src/tools/shell.rs
//! `bash_execute`: run a command string through `sh -c` under a fixed working directory
//! and a hard timeout. The child is killed when the timeout fires.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::{require_str, ToolArgs, ToolError, ToolHandler};

/// Per-stream capture limit (1 MiB)
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub struct BashExecuteTool {
    workdir: PathBuf,
    timeout: Duration,
}

impl BashExecuteTool {
    pub fn new(workdir: PathBuf, timeout: Duration) -> Self {
        Self { workdir, timeout }
    }

    pub async fn run(&self, command: &str) -> Result<CommandOutput, ToolError> {
        let start = Instant::now();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Launch(format!("{} (cwd {})", e, self.workdir.display())))?;

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(ToolError::Io(e)),
            Err(_elapsed) => {
                tracing::warn!(command = %command, timeout_secs = self.timeout.as_secs(), "⏱️ Command timed out");
                // dropping `child` kills it
                return Err(ToolError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            exit_code: status.code().unwrap_or(-1),
        };

        tracing::info!(
            exit_code = output.exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "🖥️ Command finished"
        );
        Ok(output)
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let mut limited = h.take(MAX_OUTPUT_BYTES);
        let _ = limited.read_to_end(&mut buf).await;
        // Keep the pipe open past the cap so the child is not killed by SIGPIPE
        let mut rest = limited.into_inner();
        let _ = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await;
    }
    buf
}

#[async_trait]
impl ToolHandler for BashExecuteTool {
    fn name(&self) -> &'static str {
        "bash_execute"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command in the project directory (stdout, stderr and exit code are returned)"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["command"]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let output = self.run(require_str(args, "command")?).await?;
        if output.exit_code != 0 {
            return Err(ToolError::NonZeroExit {
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(json!(output))
    }
}
