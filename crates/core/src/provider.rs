//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get a response
//! back, either as a complete message or as a stream of chunks. The agent
//! loop only ever sees a [`NormalizedResponse`], produced by folding the
//! stream through a [`ResponseAssembler`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};
use crate::tool::ToolCall;

/// Line prefix the system prompt asks the model to use for its final answer.
pub const COMPLETION_MARKER: &str = "FINAL ANSWER:";

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4", "gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool declaration sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
///
/// Tool calls only appear once complete: adapters buffer argument
/// fragments and emit each call after its block closes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Completed tool calls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// What the agent loop acts on after one provider round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedResponse {
    /// Full text content, if the model produced any
    pub text: Option<String>,

    /// Tool calls with parsed arguments, in emission order
    pub tool_calls: Vec<ToolCall>,

    /// The same calls in wire form, for the assistant message
    pub raw_tool_calls: Vec<MessageToolCall>,

    /// Set when the response carries the completion marker
    pub done: bool,

    /// Text after the completion marker
    pub final_answer: Option<String>,

    pub usage: Option<Usage>,

    pub model: String,
}

impl NormalizedResponse {
    /// The assistant message to append to the conversation.
    pub fn to_message(&self) -> Message {
        Message::assistant_with_tools(
            self.text.clone().unwrap_or_default(),
            self.raw_tool_calls.clone(),
        )
    }
}

/// Folds stream chunks into a [`NormalizedResponse`].
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    text: String,
    tool_calls: Vec<MessageToolCall>,
    usage: Option<Usage>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: StreamChunk) {
        if let Some(content) = chunk.content {
            self.text.push_str(&content);
        }
        self.tool_calls.extend(chunk.tool_calls);
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
    }

    pub fn finish(self, model: impl Into<String>) -> NormalizedResponse {
        let final_answer = find_final_answer(&self.text);
        let done = final_answer.is_some();

        let (tool_calls, raw_tool_calls) = if done {
            if !self.tool_calls.is_empty() {
                tracing::debug!(
                    discarded = self.tool_calls.len(),
                    "Completion marker present, ignoring tool calls"
                );
            }
            (Vec::new(), Vec::new())
        } else {
            let parsed = self.tool_calls.iter().map(parse_tool_call).collect();
            (parsed, self.tool_calls)
        };

        NormalizedResponse {
            text: if self.text.is_empty() { None } else { Some(self.text) },
            tool_calls,
            raw_tool_calls,
            done,
            final_answer,
            usage: self.usage,
            model: model.into(),
        }
    }
}

/// The text after a line starting with the completion marker.
pub fn find_final_answer(text: &str) -> Option<String> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with(COMPLETION_MARKER) {
            let start = offset + (line.len() - trimmed.len()) + COMPLETION_MARKER.len();
            return Some(text[start..].trim().to_string());
        }
        offset += line.len();
    }
    None
}

/// Parse wire arguments; malformed or empty JSON becomes `{}`.
pub fn parse_tool_call(call: &MessageToolCall) -> ToolCall {
    let arguments = if call.arguments.trim().is_empty() {
        serde_json::json!({})
    } else {
        match serde_json::from_str::<serde_json::Value>(&call.arguments) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    tool = %call.name,
                    call_id = %call.id,
                    error = %e,
                    "Malformed tool call arguments, using empty object"
                );
                serde_json::json!({})
            }
        }
    };

    ToolCall {
        id: call.id.clone(),
        name: call.name.clone(),
        arguments,
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. Which one is used is decided
/// once, at construction time.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: response.message.content,
                tool_calls: response.message.tool_calls,
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// Stream the request and fold it into a normalized response.
    async fn submit(&self, request: ProviderRequest) -> std::result::Result<NormalizedResponse, ProviderError> {
        let model = request.model.clone();
        let mut rx = self.stream(request).await?;
        let mut assembler = ResponseAssembler::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            let done = chunk.done;
            assembler.push(chunk);
            if done {
                break;
            }
        }
        Ok(assembler.finish(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str, args: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args.into(),
        }
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "execute_command".into(),
            description: "Execute a shell command".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The command to run" }
                },
                "required": ["command"]
            }),
        };
        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["name"], "execute_command");
        assert_eq!(json["parameters"]["required"][0], "command");
    }

    #[test]
    fn marker_only_at_line_start() {
        assert_eq!(
            find_final_answer("Thinking...\nFINAL ANSWER: 42\nmore"),
            Some("42\nmore".to_string())
        );
        assert_eq!(find_final_answer("FINAL ANSWER:done"), Some("done".to_string()));
        assert_eq!(find_final_answer("I will write FINAL ANSWER: later"), None);
    }

    #[test]
    fn assembler_concatenates_text() {
        let mut asm = ResponseAssembler::new();
        asm.push(StreamChunk { content: Some("Hel".into()), ..Default::default() });
        asm.push(StreamChunk { content: Some("lo".into()), done: true, ..Default::default() });
        let resp = asm.finish("m");
        assert_eq!(resp.text.as_deref(), Some("Hello"));
        assert!(!resp.done);
        assert!(resp.tool_calls.is_empty());
    }

    #[test]
    fn assembler_parses_arguments_in_order() {
        let mut asm = ResponseAssembler::new();
        asm.push(StreamChunk {
            tool_calls: vec![call("a", "first", r#"{"x":1}"#), call("b", "second", "not json")],
            done: true,
            ..Default::default()
        });
        let resp = asm.finish("m");
        assert_eq!(resp.tool_calls.len(), 2);
        assert_eq!(resp.tool_calls[0].name, "first");
        assert_eq!(resp.tool_calls[0].arguments["x"], 1);
        assert_eq!(resp.tool_calls[1].arguments, serde_json::json!({}));
        assert_eq!(resp.raw_tool_calls[1].arguments, "not json");
    }

    #[test]
    fn marker_discards_tool_calls() {
        let mut asm = ResponseAssembler::new();
        asm.push(StreamChunk {
            content: Some("FINAL ANSWER: all done".into()),
            tool_calls: vec![call("a", "t", "{}")],
            done: true,
            usage: None,
        });
        let resp = asm.finish("m");
        assert!(resp.done);
        assert_eq!(resp.final_answer.as_deref(), Some("all done"));
        assert!(resp.tool_calls.is_empty());
        assert!(resp.to_message().tool_calls.is_empty());
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let parsed = parse_tool_call(&call("a", "t", ""));
        assert_eq!(parsed.arguments, serde_json::json!({}));
    }

    struct Canned;

    #[async_trait]
    impl Provider for Canned {
        fn name(&self) -> &str { "canned" }
        async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant_with_tools("", vec![call("c1", "list_files", r#"{"dir":"."}"#)]),
                usage: None,
                model: request.model,
            })
        }
    }

    #[tokio::test]
    async fn default_submit_goes_through_stream() {
        let request = ProviderRequest {
            model: "test-model".into(),
            messages: vec![Message::user("list files")],
            temperature: default_temperature(),
            max_tokens: None,
            tools: vec![],
            stream: true,
        };
        let resp = Canned.submit(request).await.unwrap();
        assert_eq!(resp.model, "test-model");
        assert!(resp.text.is_none());
        assert_eq!(resp.tool_calls[0].arguments["dir"], ".");
    }
}
