//! Shell tool: execute system commands in the session's working directory.
//!
//! A bare `cd <dir>` is intercepted and moves the shared working directory
//! instead of spawning a shell, so later commands and relative file paths
//! follow it. Compound commands such as `cd build && make` go to the shell
//! unchanged and leave the working directory alone.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use hintloop_core::error::ToolError;
use hintloop_core::state::SessionState;
use hintloop_core::tool::{required_str, Tool, ToolResult};
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, warn};

/// Characters that make a `cd` line more than a plain directory change.
const SHELL_OPERATORS: &[char] = &[';', '&', '|', '<', '>', '`', '$', '(', ')', '\n'];

/// The target of a command that is nothing but `cd <path>`.
fn bare_cd_target(command: &str) -> Option<&str> {
    let rest = command.trim().strip_prefix("cd")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let target = rest.trim();
    if target.is_empty() || target.contains(SHELL_OPERATORS) {
        return None;
    }
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| target.strip_prefix(*q).and_then(|t| t.strip_suffix(*q)));
    match unquoted {
        Some(path) => Some(path),
        None if target.contains(char::is_whitespace) => None,
        None => Some(target),
    }
}

/// Run a command through `sh -c` with a wall-clock timeout.
pub struct ShellTool {
    timeout: Duration,
}

impl ShellTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn change_dir(&self, command: &str, target: &str, state: &mut SessionState) -> Result<ToolResult, ToolError> {
        let path = state.resolve_path(target);
        if !path.is_dir() {
            return Err(ToolError::NotFound(format!(
                "Directory not found: {}",
                path.display()
            )));
        }
        let path = path.canonicalize().unwrap_or(path);
        state.current_dir = path;
        Ok(ToolResult::ok(json!({
            "success": true,
            "command": command,
            "output": format!("Changed directory to: {}", state.current_dir.display()),
            "return_code": 0,
        })))
    }

    async fn spawn(&self, command: &str, cwd: &Path) -> Result<std::process::Output, ToolError> {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(cwd).kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => output.map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ToolError::Timeout {
                tool_name: self.name().into(),
                timeout_secs: self.timeout.as_secs(),
                message: format!(
                    "Command timed out after {} seconds: {command}",
                    self.timeout.as_secs()
                ),
            }),
        }
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the current directory"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional working directory for the command"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        state: &mut SessionState,
    ) -> Result<ToolResult, ToolError> {
        let command = required_str(&arguments, "command")?;

        if let Some(target) = bare_cd_target(command) {
            return self.change_dir(command, target, state);
        }

        let working_dir = match arguments["working_dir"].as_str() {
            Some(dir) => state.resolve_path(dir),
            None => state.current_dir.clone(),
        };
        if !working_dir.is_dir() {
            return Err(ToolError::NotFound(format!(
                "Directory not found: {}",
                working_dir.display()
            )));
        }

        debug!(command = %command, cwd = %working_dir.display(), "Executing shell command");
        let output = self.spawn(command, &working_dir).await?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            warn!(command = %command, exit_code = code, "Command failed");
        }

        Ok(ToolResult::ok(json!({
            "success": output.status.success(),
            "command": command,
            "output": stdout,
            "error": if stderr.is_empty() { None } else { Some(stderr) },
            "return_code": code,
            "working_dir": working_dir.display().to_string(),
        })))
    }
}
