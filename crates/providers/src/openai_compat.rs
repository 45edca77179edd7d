//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, DeepSeek, Groq and any
//! endpoint exposing `/v1/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling, with streamed argument fragments
//!   buffered per call index until the response finishes

use std::time::Duration;

use async_trait::async_trait;
use hintloop_core::error::ProviderError;
use hintloop_core::message::{Message, MessageToolCall, Role};
use hintloop_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::accumulator::ToolCallAccumulator;
use crate::http::{build_client, check_status, send_error};
use crate::sse::{data_payload, pump, SseDecoder};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: build_client(REQUEST_TIMEOUT)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: m.content.clone(),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
            body["tool_choice"] = serde_json::json!("auto");
        }

        body
    }

    async fn post(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            req = req.header("Accept", "text/event-stream");
        }
        let response = req.json(body).send().await.map_err(send_error)?;
        check_status(response, &self.name).await
    }
}

#[async_trait]
impl hintloop_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending completion request");
        let body = Self::request_body(&request, false);
        let response = self.post(&body, false).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let usage = api_response.usage.map(ApiUsage::into_usage);

        Ok(ProviderResponse {
            message: Message::assistant_with_tools(
                choice.message.content.unwrap_or_default(),
                tool_calls,
            ),
            usage,
            model: api_response.model.unwrap_or(request.model),
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");
        let body = Self::request_body(&request, true);
        let response = self.post(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(pump(response, OpenAiStreamDecoder::new(&self.name), tx));
        Ok(rx)
    }
}

/// Decodes `data: {...}` chat-completion chunks.
pub struct OpenAiStreamDecoder {
    provider: String,
    calls: ToolCallAccumulator,
    usage: Option<Usage>,
}

impl OpenAiStreamDecoder {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            calls: ToolCallAccumulator::new(),
            usage: None,
        }
    }
}

impl SseDecoder for OpenAiStreamDecoder {
    fn on_line(&mut self, line: &str) -> Result<Vec<StreamChunk>, ProviderError> {
        if line.is_empty() || line.starts_with(':') {
            return Ok(Vec::new());
        }
        let Some(data) = data_payload(line) else {
            return Ok(Vec::new());
        };

        if data == "[DONE]" {
            return Ok(vec![self.finish()]);
        }

        let parsed = match serde_json::from_str::<StreamResponse>(data) {
            Ok(p) => p,
            Err(e) => {
                trace!(provider = %self.provider, data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return Ok(Vec::new());
            }
        };

        if let Some(err) = parsed.error {
            return Err(ProviderError::StreamInterrupted(
                err["message"].as_str().unwrap_or("provider reported an error").to_string(),
            ));
        }

        if let Some(usage) = parsed.usage {
            self.usage = Some(usage.into_usage());
        }

        let mut out = Vec::new();
        for choice in parsed.choices {
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let (name, args) = match delta.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                self.calls.start(delta.index, delta.id.as_deref(), name.as_deref());
                if let Some(args) = args {
                    self.calls.append(delta.index, &args);
                }
            }

            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                out.push(StreamChunk {
                    content: Some(content),
                    ..Default::default()
                });
            }
        }
        Ok(out)
    }

    fn finish(&mut self) -> StreamChunk {
        StreamChunk {
            content: None,
            tool_calls: self.calls.close_all(),
            done: true,
            usage: self.usage.take(),
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl ApiUsage {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta: arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hintloop_core::Provider;

    fn feed(decoder: &mut OpenAiStreamDecoder, lines: &[&str]) -> Vec<StreamChunk> {
        lines.iter().flat_map(|l| decoder.on_line(l).unwrap()).collect()
    }

    #[test]
    fn openrouter_constructor() {
        let provider =
            OpenAiCompatProvider::new("openrouter", "https://openrouter.ai/api/v1", "sk-test").unwrap();
        assert_eq!(provider.name(), "openrouter");
        assert!(provider.base_url().contains("openrouter.ai"));
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn tool_only_assistant_sends_null_content() {
        let msg = Message::assistant_with_tools(
            "",
            vec![MessageToolCall {
                id: "call_1".into(),
                name: "execute_command".into(),
                arguments: r#"{"command":"ls"}"#.into(),
            }],
        );
        let api = OpenAiCompatProvider::to_api_messages(&[msg]);
        let json = serde_json::to_value(&api[0]).unwrap();
        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["function"]["name"], "execute_command");
        assert_eq!(json["tool_calls"][0]["type"], "function");
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = Message::tool_result("call_1", "result data");
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_body_declares_tools_in_order() {
        let request = ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.2,
            max_tokens: Some(64),
            tools: vec![
                ToolDefinition { name: "b".into(), description: "".into(), parameters: serde_json::json!({}) },
                ToolDefinition { name: "a".into(), description: "".into(), parameters: serde_json::json!({}) },
            ],
            stream: true,
        };
        let body = OpenAiCompatProvider::request_body(&request, true);
        assert_eq!(body["tools"][0]["function"]["name"], "b");
        assert_eq!(body["tools"][1]["function"]["name"], "a");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn stream_content_deltas() {
        let mut d = OpenAiStreamDecoder::new("test");
        let chunks = feed(
            &mut d,
            &[
                r#"data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#,
                "",
                r#"data: {"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
                "data: [DONE]",
            ],
        );
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content.as_deref(), Some("Hel"));
        assert!(chunks[2].done);
        assert!(chunks[2].tool_calls.is_empty());
    }

    #[test]
    fn stream_buffers_argument_fragments() {
        let mut d = OpenAiStreamDecoder::new("test");
        let chunks = feed(
            &mut d,
            &[
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"knowledge_base_search","arguments":""}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"hello\"}"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
                r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
                "data: [DONE]",
            ],
        );
        // nothing surfaces before the response closes
        assert_eq!(chunks.len(), 1);
        let done = &chunks[0];
        assert!(done.done);
        assert_eq!(done.tool_calls.len(), 1);
        assert_eq!(done.tool_calls[0].id, "call_abc");
        let args: serde_json::Value = serde_json::from_str(&done.tool_calls[0].arguments).unwrap();
        assert_eq!(args, serde_json::json!({"query": "hello"}));
        assert_eq!(done.usage.as_ref().unwrap().total_tokens, 15);
    }

    #[test]
    fn stream_parallel_calls_keep_index_order() {
        let mut d = OpenAiStreamDecoder::new("test");
        feed(
            &mut d,
            &[
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"calc","arguments":"{}"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"search","arguments":"{}"}}]}}]}"#,
            ],
        );
        let done = d.finish();
        let ids: Vec<&str> = done.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["call_a", "call_b"]);
    }

    #[test]
    fn unparseable_chunks_are_skipped() {
        let mut d = OpenAiStreamDecoder::new("test");
        assert!(d.on_line("data: {not json").unwrap().is_empty());
        assert!(d.on_line(": keep-alive").unwrap().is_empty());
        assert!(d.on_line("event: ping").unwrap().is_empty());
    }

    #[test]
    fn in_stream_error_aborts() {
        let mut d = OpenAiStreamDecoder::new("test");
        let err = d
            .on_line(r#"data: {"error":{"message":"upstream overloaded"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("upstream overloaded"));
    }

    #[test]
    fn parse_completion_response() {
        let data = r#"{
            "model": "gpt-4o",
            "choices": [{"message": {"role": "assistant", "content": null,
                "tool_calls": [{"id": "c1", "type": "function",
                    "function": {"name": "read_file", "arguments": "{\"file_path\":\"a\"}"}}]}}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let calls = parsed.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "read_file");
        assert!(parsed.choices[0].message.content.is_none());
    }
}
