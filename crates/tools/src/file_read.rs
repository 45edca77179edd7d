//! File read tool: text files only, with optional line ranges.

use async_trait::async_trait;
use hintloop_core::error::ToolError;
use hintloop_core::state::SessionState;
use hintloop_core::tool::{required_str, Tool, ToolResult};
use serde_json::json;
use tokio::io::AsyncReadExt;

const SNIFF_BYTES: usize = 1024;

pub struct FileReadTool;

/// Why a file was judged not to be text.
fn binary_reason(head: &[u8]) -> Option<&'static str> {
    if head.contains(&0) {
        return Some("Cannot read binary file. This tool only supports text files.");
    }
    match std::str::from_utf8(head) {
        Ok(_) => None,
        // a multi-byte char cut off by the sniff window is still text
        Err(e) if e.error_len().is_none() => None,
        Err(_) => Some("File is not a valid text file (encoding error)."),
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Returns error for binary files. Supports partial reading for large files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to read (absolute or relative to current directory)"
                },
                "begin_line": {
                    "type": "integer",
                    "description": "Optional: Line number to start reading from (1-based indexing)"
                },
                "number_lines": {
                    "type": "integer",
                    "description": "Optional: Number of lines to read from begin_line"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        state: &mut SessionState,
    ) -> Result<ToolResult, ToolError> {
        let raw_path = required_str(&arguments, "file_path")?;
        let path = state.resolve_path(raw_path);
        let display = path.display().to_string();

        if !path.exists() {
            return Err(ToolError::NotFound(format!("File not found: {display}")));
        }

        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| ToolError::from_io(self.name(), &display, e))?;
        let mut head = vec![0u8; SNIFF_BYTES];
        let n = file
            .read(&mut head)
            .await
            .map_err(|e| ToolError::from_io(self.name(), &display, e))?;
        if let Some(reason) = binary_reason(&head[..n]) {
            return Ok(ToolResult::rejected(json!({
                "success": false,
                "error": reason,
                "file_path": display,
                "is_binary": true,
            })));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ToolError::from_io(self.name(), &display, e))?;
        let size_bytes = bytes.len();
        let content = String::from_utf8(bytes).map_err(|_| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("{display} is not valid UTF-8"),
        })?;

        let begin_line = arguments["begin_line"].as_i64();
        let number_lines = arguments["number_lines"].as_u64();

        if begin_line.is_none() && number_lines.is_none() {
            return Ok(ToolResult::ok(json!({
                "success": true,
                "file_path": display,
                "lines": content.lines().count(),
                "size_bytes": size_bytes,
                "partial_read": false,
                "content": content,
            })));
        }

        let all: Vec<&str> = content.split_inclusive('\n').collect();
        let total_lines = all.len();
        let start = begin_line
            .map(|b| usize::try_from(b.saturating_sub(1).max(0)).unwrap_or(usize::MAX))
            .unwrap_or(0);
        if start >= total_lines {
            return Ok(ToolResult::rejected(json!({
                "success": false,
                "error": format!(
                    "begin_line {} is beyond file length ({total_lines} lines)",
                    begin_line.unwrap_or(1)
                ),
                "file_path": display,
                "total_lines": total_lines,
            })));
        }
        let end = match number_lines {
            Some(n) => start
                .saturating_add(usize::try_from(n).unwrap_or(usize::MAX))
                .min(total_lines),
            None => total_lines,
        };
        let selected = &all[start..end];

        Ok(ToolResult::ok(json!({
            "success": true,
            "file_path": display,
            "content": selected.concat(),
            "size_bytes": size_bytes,
            "total_lines": total_lines,
            "begin_line": start + 1,
            "end_line": end,
            "lines_read": selected.len(),
            "partial_read": true,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_in(dir: &std::path::Path) -> SessionState {
        SessionState::new(dir)
    }

    #[test]
    fn tool_definition() {
        let schema = FileReadTool.parameters_schema();
        assert_eq!(FileReadTool.name(), "read_file");
        assert_eq!(schema["required"], json!(["file_path"]));
        assert!(schema["properties"]["begin_line"].is_object());
    }

    #[tokio::test]
    async fn read_relative_to_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "alpha\nbeta\n").unwrap();
        let mut state = state_in(dir.path());

        let result = FileReadTool
            .execute(json!({"file_path": "notes.txt"}), &mut state)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data["content"], "alpha\nbeta\n");
        assert_eq!(result.data["lines"], 2);
        assert_eq!(result.data["partial_read"], false);
    }

    #[tokio::test]
    async fn same_file_same_result() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "fixed").unwrap();
        let mut state = state_in(dir.path());
        let args = json!({"file_path": "a.txt"});

        let first = FileReadTool.execute(args.clone(), &mut state).await.unwrap();
        let second = FileReadTool.execute(args, &mut state).await.unwrap();
        assert_eq!(first.data, second.data);
    }

    #[tokio::test]
    async fn ranged_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lines.txt"), "1\n2\n3\n4\n5\n").unwrap();
        let mut state = state_in(dir.path());

        let result = FileReadTool
            .execute(
                json!({"file_path": "lines.txt", "begin_line": 2, "number_lines": 2}),
                &mut state,
            )
            .await
            .unwrap();
        assert_eq!(result.data["content"], "2\n3\n");
        assert_eq!(result.data["total_lines"], 5);
        assert_eq!(result.data["begin_line"], 2);
        assert_eq!(result.data["end_line"], 3);
        assert_eq!(result.data["lines_read"], 2);
        assert_eq!(result.data["partial_read"], true);
    }

    #[tokio::test]
    async fn huge_number_lines_reads_to_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lines.txt"), "1\n2\n3\n").unwrap();
        let mut state = state_in(dir.path());

        let result = FileReadTool
            .execute(
                json!({"file_path": "lines.txt", "begin_line": 2, "number_lines": u64::MAX}),
                &mut state,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data["content"], "2\n3\n");
        assert_eq!(result.data["end_line"], 3);
        assert_eq!(result.data["lines_read"], 2);
    }

    #[tokio::test]
    async fn extreme_begin_line_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lines.txt"), "1\n2\n3\n").unwrap();
        let mut state = state_in(dir.path());

        let result = FileReadTool
            .execute(
                json!({"file_path": "lines.txt", "begin_line": i64::MIN, "number_lines": 1}),
                &mut state,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data["content"], "1\n");
        assert_eq!(result.data["begin_line"], 1);

        let past = FileReadTool
            .execute(
                json!({"file_path": "lines.txt", "begin_line": i64::MAX}),
                &mut state,
            )
            .await
            .unwrap();
        assert!(!past.success);
        assert_eq!(past.data["total_lines"], 3);
    }

    #[tokio::test]
    async fn begin_line_past_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("short.txt"), "only\n").unwrap();
        let mut state = state_in(dir.path());

        let result = FileReadTool
            .execute(json!({"file_path": "short.txt", "begin_line": 10}), &mut state)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.is_none());
        assert_eq!(
            result.data["error"],
            "begin_line 10 is beyond file length (1 lines)"
        );
    }

    #[tokio::test]
    async fn binary_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0x89, b'P', 0x00, 0x01]).unwrap();
        let mut state = state_in(dir.path());

        let result = FileReadTool
            .execute(json!({"file_path": "blob.bin"}), &mut state)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.data["is_binary"], true);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());

        let err = FileReadTool
            .execute(json!({"file_path": "nope.txt"}), &mut state)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn truncated_multibyte_is_text() {
        let s = "héllo".as_bytes();
        assert!(binary_reason(&s[..2]).is_none());
        assert!(binary_reason(&[0xFF, 0xFE, b'a']).is_some());
    }
}
