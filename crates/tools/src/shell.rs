//! Shell tool — execute system commands.
//!
//! Supports command allowlisting and a per-call timeout. A timeout is a
//! result, not an error: the model sees `"Error: Command timed out after
//! Ns"` and can decide what to do next.

use async_trait::async_trait;
use std::time::Duration;
use switchboard_core::{Tool, ToolError};
use tokio::process::Command;
use tracing::{debug, warn};

/// Default per-call timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Execute shell commands with safety constraints.
pub struct ShellTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self { allowed_commands }
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true; // No allowlist = all commands allowed
        }

        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();
        self.allowed_commands.iter().any(|a| a == base_cmd)
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout/stderr. Use this for running programs, checking files, git operations, etc."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds (default 30)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;
        let timeout_secs = arguments["timeout"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS);

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "shell".into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        debug!(command = %command, timeout_secs, "Executing shell command");

        let run = async {
            if cfg!(target_os = "windows") {
                Command::new("cmd").args(["/C", command]).output().await
            } else {
                Command::new("sh").args(["-c", command]).output().await
            }
        };

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), run).await {
            Err(_) => {
                warn!(command = %command, timeout_secs, "Command timed out");
                return Ok(format!("Error: Command timed out after {timeout_secs}s"));
            }
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "shell".into(),
                    reason: e.to_string(),
                })
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let result_text = if output.status.success() {
            if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        Ok(result_text.trim().to_string())
    }
}
