//! Python code interpreter tool.
//!
//! Runs the snippet with `python -c` in a child process. There is no
//! sandbox beyond the wall-clock timeout; the child runs in the session's
//! working directory with the host's privileges.

use std::time::Duration;

use async_trait::async_trait;
use hintloop_core::error::ToolError;
use hintloop_core::state::SessionState;
use hintloop_core::tool::{required_str, Tool, ToolResult};
use serde_json::json;
use tokio::process::Command;
use tracing::debug;

pub struct CodeInterpreterTool {
    python: String,
    timeout: Duration,
}

impl CodeInterpreterTool {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }
}

/// Last non-empty stderr line: the exception summary for a Python traceback.
fn error_summary(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("process exited with an error")
}

#[async_trait]
impl Tool for CodeInterpreterTool {
    fn name(&self) -> &str {
        "code_interpreter"
    }

    fn description(&self) -> &str {
        "Execute Python code in a subprocess and return its stdout and stderr"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python code to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        state: &mut SessionState,
    ) -> Result<ToolResult, ToolError> {
        let code = required_str(&arguments, "code")?;
        debug!(interpreter = %self.python, bytes = code.len(), "Running code");

        let mut cmd = Command::new(&self.python);
        cmd.arg("-c").arg(code).kill_on_drop(true);
        if state.current_dir.is_dir() {
            cmd.current_dir(&state.current_dir);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => output.map_err(|e| {
                ToolError::from_io(self.name(), &format!("Failed to start {}", self.python), e)
            })?,
            Err(_) => {
                return Err(ToolError::timeout(
                    self.name(),
                    self.timeout.as_secs(),
                    "Code execution",
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: error_summary(&stderr).to_string(),
            });
        }

        Ok(ToolResult::ok(json!({
            "success": true,
            "stdout": stdout,
            "stderr": stderr,
            "return_code": output.status.code().unwrap_or(0),
        })))
    }
}
