//! TODO list tools backed by the shared session state.

use async_trait::async_trait;
use hintloop_core::error::ToolError;
use hintloop_core::state::{SessionState, TodoStatus};
use hintloop_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use serde_json::json;

/// Replace the open items of the TODO list.
pub struct RewriteTodoTool;

#[async_trait]
impl Tool for RewriteTodoTool {
    fn name(&self) -> &str {
        "rewrite_todo_list"
    }

    fn description(&self) -> &str {
        "Rewrite the TODO list with new pending items (keeps completed/cancelled items)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of new TODO items to add as pending"
                }
            },
            "required": ["items"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        state: &mut SessionState,
    ) -> Result<ToolResult, ToolError> {
        let items: Vec<String> = serde_json::from_value(arguments["items"].clone())
            .map_err(|_| {
                ToolError::InvalidArguments("'items' must be an array of strings".into())
            })?;

        let summary = state.todos.rewrite(items);
        Ok(ToolResult::ok(json!({
            "success": true,
            "kept_items": summary.kept,
            "new_items": summary.added,
            "total_items": summary.total,
        })))
    }
}

#[derive(Deserialize)]
struct StatusUpdate {
    id: u32,
    status: String,
}

/// Change the status of existing TODO items.
pub struct UpdateTodoTool;

#[async_trait]
impl Tool for UpdateTodoTool {
    fn name(&self) -> &str {
        "update_todo_status"
    }

    fn description(&self) -> &str {
        "Update the status of existing TODO items"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "updates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer", "description": "TODO item ID" },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed", "cancelled"],
                                "description": "New status for the item"
                            }
                        },
                        "required": ["id", "status"]
                    },
                    "description": "List of TODO items to update with their new status"
                }
            },
            "required": ["updates"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        state: &mut SessionState,
    ) -> Result<ToolResult, ToolError> {
        let updates: Vec<StatusUpdate> = serde_json::from_value(arguments["updates"].clone())
            .map_err(|e| ToolError::InvalidArguments(format!("'updates' is malformed: {e}")))?;

        // validate everything before touching the list
        let parsed = updates
            .into_iter()
            .map(|u| {
                u.status
                    .parse::<TodoStatus>()
                    .map(|s| (u.id, s))
                    .map_err(ToolError::InvalidArguments)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let updated = parsed
            .into_iter()
            .filter(|&(id, status)| state.todos.update(id, status))
            .count();

        Ok(ToolResult::ok(json!({
            "success": true,
            "updated_items": updated,
            "total_items": state.todos.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rewrite_then_update() {
        let mut state = SessionState::default();

        let r = RewriteTodoTool
            .execute(json!({"items": ["scan repo", "write report"]}), &mut state)
            .await
            .unwrap();
        assert_eq!(r.data["new_items"], 2);
        assert_eq!(r.data["total_items"], 2);

        let u = UpdateTodoTool
            .execute(
                json!({"updates": [{"id": 1, "status": "completed"}, {"id": 99, "status": "cancelled"}]}),
                &mut state,
            )
            .await
            .unwrap();
        assert_eq!(u.data["updated_items"], 1);

        // the completed item survives the next rewrite
        let r = RewriteTodoTool
            .execute(json!({"items": ["publish"]}), &mut state)
            .await
            .unwrap();
        assert_eq!(r.data["kept_items"], 1);
        assert_eq!(r.data["total_items"], 2);
        assert_eq!(state.todos.items()[1].id, 3);
    }

    #[tokio::test]
    async fn bad_status_changes_nothing() {
        let mut state = SessionState::default();
        state.todos.rewrite(["a"]);

        let err = UpdateTodoTool
            .execute(
                json!({"updates": [{"id": 1, "status": "completed"}, {"id": 1, "status": "done"}]}),
                &mut state,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid status 'done'"));
        assert_eq!(state.todos.items()[0].status, TodoStatus::Pending);
    }

    #[tokio::test]
    async fn items_must_be_strings() {
        let mut state = SessionState::default();
        let err = RewriteTodoTool
            .execute(json!({"items": "not a list"}), &mut state)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArguments");
    }
}
