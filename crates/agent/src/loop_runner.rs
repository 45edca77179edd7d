//! The agent loop implementation.
//!
//! One run is a small state machine:
//!
//! ```text
//! AwaitingResponse --(tool calls)--> ExecutingTools --> AwaitingResponse
//!        |
//!        +--(completion marker | plain text | iteration ceiling)--> Terminated
//! ```
//!
//! Only provider failures end a run with an error. Unknown tools, bad
//! arguments and handler failures are written back into the conversation
//! as tool results so the model can react to them.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use hintloop_config::AppConfig;
use hintloop_core::error::ProviderError;
use hintloop_core::event::{DomainEvent, EventBus};
use hintloop_core::message::{Conversation, Message};
use hintloop_core::provider::{NormalizedResponse, Provider, ProviderRequest, ResponseAssembler};
use hintloop_core::state::SharedState;
use hintloop_core::tool::{ToolCall, ToolRegistry};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hints::HintBuilder;
use crate::stream_event::AgentStreamEvent;
use crate::trajectory::{ToolCallRecord, TrajectoryRecord, TrajectoryRecorder};

/// Answer returned when a run hits its iteration ceiling.
pub const MAX_ITERATIONS_MESSAGE: &str =
    "I need more iterations to fully answer your question. Please try rephrasing or breaking down your query.";

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatedBy {
    CompletionMarker,
    PlainText,
    MaxIterations,
}

/// The result of one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub final_answer: String,
    /// False only when the iteration ceiling was reached
    pub success: bool,
    pub iterations: u32,
    pub tool_calls_count: usize,
    pub tool_calls: Vec<ToolCallRecord>,
    pub terminated_by: TerminatedBy,
}

enum LoopState {
    AwaitingResponse,
    ExecutingTools(Vec<ToolCall>),
    Terminated(TerminatedBy, String),
}

/// Orchestrates provider requests and tool execution for one session.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    state: SharedState,
    hints: HintBuilder,
    max_iterations: u32,
    /// Messages re-submitted per request; 0 = all
    history_limit: usize,
    event_bus: Arc<EventBus>,
    trajectory: TrajectoryRecorder,
}

impl AgentLoop {
    /// Create a new agent loop with default settings and every hint off.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        state: SharedState,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            state,
            hints: HintBuilder::new(hintloop_config::HintsConfig::disabled()),
            max_iterations: 20,
            history_limit: 0,
            event_bus: Arc::new(EventBus::default()),
            trajectory: TrajectoryRecorder::disabled(),
        }
    }

    /// Build a loop with every setting taken from `config`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        state: SharedState,
    ) -> Self {
        let trajectory = if config.trajectory.enabled {
            TrajectoryRecorder::new(&config.trajectory.path)
        } else {
            TrajectoryRecorder::disabled()
        };
        Self::new(provider, config.provider_model(), tools, state)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_max_iterations(config.agent.max_iterations)
            .with_history_limit(config.agent.history_limit)
            .with_hints(HintBuilder::new(config.hints.clone()))
            .with_trajectory(trajectory)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of provider round trips per run.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_hints(mut self, hints: HintBuilder) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn with_trajectory(mut self, recorder: TrajectoryRecorder) -> Self {
        self.trajectory = recorder;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn trajectory(&self) -> &TrajectoryRecorder {
        &self.trajectory
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run the loop on `input` until it terminates.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        input: &str,
    ) -> Result<RunOutcome, ProviderError> {
        self.run_observed(conversation, input, None).await
    }

    /// Like [`run`](Self::run), reporting progress to `observer`. A dropped
    /// receiver does not stop the run.
    pub async fn run_observed(
        &self,
        conversation: &mut Conversation,
        input: &str,
        observer: Option<mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<RunOutcome, ProviderError> {
        let observer = observer.as_ref();
        info!(
            conversation_id = %conversation.id,
            provider = self.provider.name(),
            model = %self.model,
            "Agent run started"
        );
        self.event_bus.publish(DomainEvent::RunStarted {
            conversation_id: conversation.id.to_string(),
            input_preview: input.chars().take(100).collect(),
            timestamp: Utc::now(),
        });

        conversation.push(Message::user(self.hints.stamp_input(input)));

        let tool_definitions = self.tools.describe_all();
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut iteration: u32 = 0;
        let mut phase = LoopState::AwaitingResponse;

        let (terminated_by, final_answer) = loop {
            phase = match phase {
                LoopState::Terminated(by, answer) => break (by, answer),

                LoopState::AwaitingResponse if iteration >= self.max_iterations => {
                    warn!(
                        conversation_id = %conversation.id,
                        iterations = iteration,
                        "Max iterations reached without a final answer"
                    );
                    emit(
                        observer,
                        AgentStreamEvent::MaxIterationsReached {
                            iterations: iteration,
                            message: MAX_ITERATIONS_MESSAGE.into(),
                        },
                    )
                    .await;
                    LoopState::Terminated(TerminatedBy::MaxIterations, MAX_ITERATIONS_MESSAGE.into())
                }

                LoopState::AwaitingResponse => {
                    iteration += 1;
                    debug!(
                        conversation_id = %conversation.id,
                        iteration,
                        max = self.max_iterations,
                        "Agent loop iteration"
                    );
                    emit(
                        observer,
                        AgentStreamEvent::IterationStart {
                            iteration,
                            max_iterations: self.max_iterations,
                        },
                    )
                    .await;

                    let request = self.build_request(conversation, &tool_definitions, observer.is_some()).await;
                    let response = match self.fetch(request, observer).await {
                        Ok(response) => response,
                        Err(e) => {
                            warn!(conversation_id = %conversation.id, error = %e, "Provider request failed");
                            emit(observer, AgentStreamEvent::Error { message: e.to_string() }).await;
                            self.save_trajectory(conversation, &records, iteration, None).await;
                            self.publish_finished(conversation, iteration, false);
                            return Err(e);
                        }
                    };

                    if let Some(usage) = &response.usage {
                        self.event_bus.publish(DomainEvent::ResponseGenerated {
                            conversation_id: conversation.id.to_string(),
                            model: response.model.clone(),
                            tokens_used: usage.total_tokens,
                            timestamp: Utc::now(),
                        });
                    }

                    conversation.push(response.to_message());
                    self.after_response(response)
                }

                LoopState::ExecutingTools(calls) => {
                    debug!(tool_count = calls.len(), "Executing tool calls");
                    self.execute_batch(conversation, &calls, &mut records, observer).await;
                    emit(observer, AgentStreamEvent::IterationEnd { iteration }).await;
                    self.save_trajectory(conversation, &records, iteration, None).await;
                    LoopState::AwaitingResponse
                }
            };
        };

        let success = terminated_by != TerminatedBy::MaxIterations;
        if success {
            emit(observer, AgentStreamEvent::IterationEnd { iteration }).await;
        }
        self.save_trajectory(conversation, &records, iteration, success.then(|| final_answer.clone()))
            .await;
        self.publish_finished(conversation, iteration, success);

        info!(
            conversation_id = %conversation.id,
            iterations = iteration,
            tool_calls = records.len(),
            success,
            "Agent run finished"
        );
        emit(
            observer,
            AgentStreamEvent::Done {
                final_answer: final_answer.clone(),
                success,
                iterations: iteration,
                tool_calls_count: records.len(),
            },
        )
        .await;

        Ok(RunOutcome {
            final_answer,
            success,
            iterations: iteration,
            tool_calls_count: records.len(),
            tool_calls: records,
            terminated_by,
        })
    }

    /// Decide the next state from a provider response.
    fn after_response(&self, response: NormalizedResponse) -> LoopState {
        if response.done {
            let answer = response.final_answer.unwrap_or_default();
            info!(preview = %answer.chars().take(100).collect::<String>(), "Final answer found");
            return LoopState::Terminated(TerminatedBy::CompletionMarker, answer);
        }
        if response.tool_calls.is_empty() {
            let answer = response.text.unwrap_or_default().trim().to_string();
            return LoopState::Terminated(TerminatedBy::PlainText, answer);
        }
        LoopState::ExecutingTools(response.tool_calls)
    }

    /// The request for the next iteration: the (windowed) conversation plus
    /// a freshly built system hint that is never stored.
    async fn build_request(
        &self,
        conversation: &Conversation,
        tool_definitions: &[hintloop_core::provider::ToolDefinition],
        stream: bool,
    ) -> ProviderRequest {
        let mut messages = conversation.window(self.history_limit);
        let hint = {
            let state = self.state.lock().await;
            self.hints.system_hint(&state)
        };
        if let Some(hint) = hint {
            messages.push(Message::user(hint));
        }

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tool_definitions.to_vec(),
            stream,
        }
    }

    /// One provider round trip. With an observer the stream is consumed
    /// here so text chunks can be forwarded as they arrive.
    async fn fetch(
        &self,
        request: ProviderRequest,
        observer: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<NormalizedResponse, ProviderError> {
        let Some(tx) = observer else {
            return self.provider.submit(request).await;
        };

        let model = request.model.clone();
        let mut rx = self.provider.stream(request).await?;
        let mut assembler = ResponseAssembler::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(content) = chunk.content.as_ref().filter(|c| !c.is_empty()) {
                let _ = tx
                    .send(AgentStreamEvent::Chunk {
                        content: content.clone(),
                    })
                    .await;
            }
            let done = chunk.done;
            assembler.push(chunk);
            if done {
                break;
            }
        }
        Ok(assembler.finish(model))
    }

    /// Execute every call in emission order under one lock of the session
    /// state. A failing call never stops the rest of the batch.
    async fn execute_batch(
        &self,
        conversation: &mut Conversation,
        calls: &[ToolCall],
        records: &mut Vec<ToolCallRecord>,
        observer: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) {
        let mut state = self.state.lock().await;

        for call in calls {
            let call_number = self.hints.call_number(&mut state, &call.name);
            info!(tool = %call.name, call_number, "Executing tool");
            emit(
                observer,
                AgentStreamEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    call_number,
                },
            )
            .await;

            let started = Instant::now();
            let result = self.tools.execute(call, &mut state).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            self.event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: result.success,
                duration_ms,
                timestamp: Utc::now(),
            });

            let error_text = result
                .error
                .as_ref()
                .map(|failure| self.hints.error_text(call, failure));
            let body = match &error_text {
                Some(text) => serde_json::json!({ "error": text }).to_string(),
                None => result.to_content(),
            };
            let content = self.hints.tool_content(call_number, &call.name, &body);
            conversation.push(if error_text.is_some() {
                Message::tool_error(&call.id, content.clone())
            } else {
                Message::tool_result(&call.id, content.clone())
            });

            emit(
                observer,
                AgentStreamEvent::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    success: result.success,
                    content,
                    duration_ms,
                },
            )
            .await;

            records.push(ToolCallRecord {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
                result: error_text.is_none().then(|| result.data.clone()),
                error: error_text,
                call_number,
                timestamp: Utc::now(),
                duration_ms,
            });
        }
    }

    async fn save_trajectory(
        &self,
        conversation: &Conversation,
        records: &[ToolCallRecord],
        iteration: u32,
        final_answer: Option<String>,
    ) {
        if self.trajectory.path().is_none() {
            return;
        }
        let snapshot = self.state.snapshot().await;
        let record = TrajectoryRecord {
            timestamp: Utc::now(),
            iteration,
            provider: self.provider.name().to_string(),
            model: self.model.clone(),
            conversation: conversation.messages.clone(),
            tool_calls: records.to_vec(),
            todo_list: snapshot.todos.items().to_vec(),
            current_directory: snapshot.current_dir,
            final_answer,
            background_processes: snapshot.background_processes,
            config: self.hints.config().clone(),
        };
        self.trajectory.record(&record).await;
    }

    fn publish_finished(&self, conversation: &Conversation, iterations: u32, success: bool) {
        self.event_bus.publish(DomainEvent::RunFinished {
            conversation_id: conversation.id.to_string(),
            iterations,
            success,
            timestamp: Utc::now(),
        });
    }
}

async fn emit(observer: Option<&mpsc::Sender<AgentStreamEvent>>, event: AgentStreamEvent) {
    if let Some(tx) = observer {
        let _ = tx.send(event).await;
    }
}
