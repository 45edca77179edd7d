//! Tool trait and the ordered tool registry.
//!
//! Tools are what give the agent the ability to act: read and write files,
//! run shell commands, query a knowledge base, proxy MCP servers. The
//! registry owns them, hands their declarations to the provider and turns
//! every execution (successful or not) into a [`ToolResult`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{DuplicateToolError, ToolError};
use crate::provider::ToolDefinition;
use crate::state::SessionState;

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Parsed arguments (an empty object when the model sent malformed JSON)
    pub arguments: serde_json::Value,
}

/// Structured description of a failed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&ToolError> for ToolFailure {
    fn from(err: &ToolError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            suggestion: err.suggestion(),
        }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Result payload, opaque to the loop
    #[serde(default)]
    pub data: serde_json::Value,

    /// Set when the tool could not run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            data,
            error: None,
        }
    }

    /// A handled failure: the tool ran but reports `success: false` in its
    /// own payload (binary file, missing document).
    pub fn rejected(data: serde_json::Value) -> Self {
        Self {
            call_id: String::new(),
            success: false,
            data,
            error: None,
        }
    }

    pub fn failed(call_id: impl Into<String>, err: &ToolError) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            data: serde_json::Value::Null,
            error: Some(ToolFailure::from(err)),
        }
    }

    /// The JSON that is written into the tool-result message.
    pub fn to_content(&self) -> String {
        match &self.error {
            Some(failure) => serde_json::json!({ "error": failure.message }).to_string(),
            None => self.data.to_string(),
        }
    }
}

/// The core Tool trait.
///
/// Handlers receive the locked session state so that tools touching the
/// cwd or the TODO list never interleave with another run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "execute_command", "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        state: &mut SessionState,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, kept in registration order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), DuplicateToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(DuplicateToolError(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// All declarations, in registration order.
    pub fn describe_all(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call. Never fails: unknown tools and handler errors
    /// come back as failure results.
    pub async fn execute(&self, call: &ToolCall, state: &mut SessionState) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            return ToolResult::failed(&call.id, &ToolError::UnknownTool(call.name.clone()));
        };

        match tool.execute(call.arguments.clone(), state).await {
            Ok(mut result) => {
                result.call_id = call.id.clone();
                result
            }
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "Tool execution failed");
                ToolResult::failed(&call.id, &err)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull a required string argument out of a JSON object.
pub fn required_str<'a>(
    arguments: &'a serde_json::Value,
    key: &str,
) -> std::result::Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing required parameter: {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _state: &mut SessionState,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = required_str(&arguments, "text")?;
            Ok(ToolResult::ok(serde_json::json!({ "text": text })))
        }
    }

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str { self.0 }
        fn description(&self) -> &str { "" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({"type": "object"}) }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
            _state: &mut SessionState,
        ) -> std::result::Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(serde_json::Value::Null))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let err = registry.register(Box::new(EchoTool)).unwrap_err();
        assert_eq!(err, DuplicateToolError("echo".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn describe_all_is_in_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Box::new(NamedTool(name))).unwrap();
        }
        let first: Vec<String> = registry.describe_all().into_iter().map(|d| d.name).collect();
        let second: Vec<String> = registry.describe_all().into_iter().map(|d| d.name).collect();
        assert_eq!(first, vec!["zeta", "alpha", "mid"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let mut state = SessionState::new("/");

        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hello world"}),
        };
        let result = registry.execute(&call, &mut state).await;
        assert!(result.success);
        assert_eq!(result.call_id, "call_1");
        assert_eq!(result.data["text"], "hello world");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure_result() {
        let registry = ToolRegistry::new();
        let mut state = SessionState::new("/");
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };
        let result = registry.execute(&call, &mut state).await;
        assert!(!result.success);
        let failure = result.error.unwrap();
        assert_eq!(failure.kind, "UnknownTool");
        assert!(failure.message.contains("nonexistent"));
    }

    #[tokio::test]
    async fn missing_argument_is_a_failure_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let mut state = SessionState::new("/");
        let call = ToolCall {
            id: "c".into(),
            name: "echo".into(),
            arguments: serde_json::json!({}),
        };
        let result = registry.execute(&call, &mut state).await;
        assert!(!result.success);
        assert_eq!(result.error.as_ref().unwrap().kind, "InvalidArguments");
        assert!(result.to_content().contains("Missing required parameter: text"));
    }
}
