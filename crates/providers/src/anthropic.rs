//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via typed SSE events; a tool call is emitted when its
//!   `content_block_stop` arrives

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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: build_client(REQUEST_TIMEOUT)?,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Anthropic puts system prompts in a top-level field, not in messages.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(msg.text()),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    /// Convert messages to Anthropic API format.
    ///
    /// Tool results travel as user turns. Consecutive user turns (a batch of
    /// tool results followed by a system hint) are merged, because the API
    /// requires roles to alternate. The first turn must come from the user,
    /// so anything a bounded history window left in front of it is dropped.
    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();
        let first_user = messages
            .iter()
            .position(|m| m.role == Role::User)
            .unwrap_or(0);

        for msg in &messages[first_user..] {
            let (role, blocks) = match msg.role {
                Role::User => ("user", vec![ContentBlock::Text { text: msg.text().to_string() }]),
                Role::Tool => (
                    "user",
                    vec![ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.text().to_string(),
                        is_error: msg.is_error,
                    }],
                ),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !msg.text().is_empty() {
                        blocks.push(ContentBlock::Text { text: msg.text().to_string() });
                    }
                    for tc in &msg.tool_calls {
                        let input = serde_json::from_str(&tc.arguments)
                            .unwrap_or_else(|_| serde_json::json!({}));
                        blocks.push(ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input,
                        });
                    }
                    ("assistant", blocks)
                }
                Role::System => continue,
            };

            match result.last_mut() {
                Some(prev) if prev.role == role => prev.content.extend(blocks),
                _ => result.push(AnthropicMessage {
                    role: role.to_string(),
                    content: AnthropicContent::Blocks(blocks),
                }),
            }
        }

        for msg in &mut result {
            msg.content.simplify();
        }
        result
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });

        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    async fn post(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let mut req = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json");
        if stream {
            req = req.header("Accept", "text/event-stream");
        }
        let response = req.json(body).send().await.map_err(send_error)?;
        check_status(response, "anthropic").await
    }

    /// Convert Anthropic API response to our ProviderResponse.
    fn response_to_provider_response(resp: AnthropicResponse) -> ProviderResponse {
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text } => {
                    if !text_content.is_empty() {
                        text_content.push('\n');
                    }
                    text_content.push_str(&text);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(MessageToolCall {
                        id,
                        name,
                        arguments: input.to_string(),
                    });
                }
                ResponseContentBlock::Other => {}
            }
        }

        ProviderResponse {
            message: Message::assistant_with_tools(text_content, tool_calls),
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
            model: resp.model,
        }
    }
}

#[async_trait]
impl hintloop_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        debug!(provider = "anthropic", model = %request.model, "Sending completion request");
        let body = Self::request_body(&request, false);
        let response = self.post(&body, false).await?;

        let api_resp: AnthropicResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse Anthropic response: {e}"))
        })?;

        Ok(Self::response_to_provider_response(api_resp))
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");
        let body = Self::request_body(&request, true);
        let response = self.post(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(pump(response, AnthropicStreamDecoder::default(), tx));
        Ok(rx)
    }
}

/// Decodes Anthropic's typed stream events.
#[derive(Default)]
pub struct AnthropicStreamDecoder {
    calls: ToolCallAccumulator,
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicStreamDecoder {
    fn usage(&self) -> Option<Usage> {
        if self.input_tokens == 0 && self.output_tokens == 0 {
            return None;
        }
        Some(Usage {
            prompt_tokens: self.input_tokens,
            completion_tokens: self.output_tokens,
            total_tokens: self.input_tokens + self.output_tokens,
        })
    }
}

impl SseDecoder for AnthropicStreamDecoder {
    fn on_line(&mut self, line: &str) -> Result<Vec<StreamChunk>, ProviderError> {
        // `event:` lines repeat the `type` field of the data payload
        let Some(data) = data_payload(line) else {
            return Ok(Vec::new());
        };
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                return Ok(Vec::new());
            }
        };
        let index = event["index"].as_u64().unwrap_or(0) as u32;

        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                if let Some(n) = event["message"]["usage"]["input_tokens"].as_u64() {
                    self.input_tokens = n as u32;
                }
            }
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    self.calls.start(index, block["id"].as_str(), block["name"].as_str());
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta["text"].as_str() {
                            return Ok(vec![StreamChunk {
                                content: Some(text.to_string()),
                                ..Default::default()
                            }]);
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) = delta["partial_json"].as_str() {
                            self.calls.append(index, partial);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(call) = self.calls.close(index) {
                    return Ok(vec![StreamChunk {
                        tool_calls: vec![call],
                        ..Default::default()
                    }]);
                }
            }
            "message_delta" => {
                if let Some(n) = event["usage"]["output_tokens"].as_u64() {
                    self.output_tokens = n as u32;
                }
            }
            "message_stop" => return Ok(vec![self.finish()]),
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error")
                    .to_string();
                return Err(match event["error"]["type"].as_str() {
                    Some("overloaded_error") | Some("rate_limit_error") => {
                        ProviderError::RateLimited { retry_after_secs: 5 }
                    }
                    _ => ProviderError::StreamInterrupted(message),
                });
            }
            _ => {}
        }
        Ok(Vec::new())
    }

    fn finish(&mut self) -> StreamChunk {
        StreamChunk {
            content: None,
            tool_calls: self.calls.close_all(),
            done: true,
            usage: self.usage(),
        }
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl AnthropicContent {
    fn extend(&mut self, more: Vec<ContentBlock>) {
        match self {
            Self::Blocks(blocks) => blocks.extend(more),
            Self::Text(text) => {
                let mut blocks = vec![ContentBlock::Text { text: std::mem::take(text) }];
                blocks.extend(more);
                *self = Self::Blocks(blocks);
            }
        }
    }

    /// A lone text block is sent as a plain string.
    fn simplify(&mut self) {
        if let Self::Blocks(blocks) = self {
            if let [ContentBlock::Text { text }] = blocks.as_mut_slice() {
                *self = Self::Text(std::mem::take(text));
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
