//! File write tool: create or overwrite a file, making parent directories.

use async_trait::async_trait;
use hintloop_core::error::ToolError;
use hintloop_core::state::SessionState;
use hintloop_core::tool::{required_str, Tool, ToolResult};
use serde_json::json;

pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file (creates or overwrites)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        state: &mut SessionState,
    ) -> Result<ToolResult, ToolError> {
        let raw_path = required_str(&arguments, "file_path")?;
        let content = required_str(&arguments, "content")?;
        let path = state.resolve_path(raw_path);
        let display = path.display().to_string();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::from_io(self.name(), "Failed to create directory", e))?;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::from_io(self.name(), &display, e))?;

        Ok(ToolResult::ok(json!({
            "success": true,
            "file_path": display,
            "bytes_written": content.len(),
            "lines_written": content.lines().count(),
        })))
    }
}
