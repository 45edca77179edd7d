//! HTTP gateway for hintloop.
//!
//! Hosts a single agent session and accepts inbound events over HTTP:
//!
//! - `POST /event`: Run the agent on one event, return the outcome
//! - `POST /event/stream`: Same run, streamed as SSE
//! - `GET  /health`: Liveness
//! - `GET  /agent/status`: Session state summary
//! - `POST /agent/reset`: Clear conversation and session state
//! - `POST /process/register`: Track a background process
//! - `POST /process/unregister`: Forget a background process
//! - `GET  /mcp/status`: MCP proxy tools in use
//!
//! Built on Axum.

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use hintloop_agent::{AgentLoop, AgentStreamEvent, RunOutcome};
use hintloop_config::AppConfig;
use hintloop_core::message::Conversation;
use hintloop_core::state::SharedState;
use hintloop_core::trigger::InboundEvent;

/// Request bodies above this size are rejected.
const BODY_LIMIT: usize = 1024 * 1024;

/// The hosted session.
pub struct GatewayState {
    pub agent: AgentLoop,
    /// Held for the whole run, so events are processed one at a time
    pub conversation: Mutex<Conversation>,
    pub mcp_enabled: bool,
    pub mcp_tools: Vec<String>,
}

impl GatewayState {
    pub fn new(agent: AgentLoop, conversation: Conversation) -> Self {
        Self {
            agent,
            conversation: Mutex::new(conversation),
            mcp_enabled: false,
            mcp_tools: Vec::new(),
        }
    }

    pub fn with_mcp(mut self, enabled: bool, tools: Vec<String>) -> Self {
        self.mcp_enabled = enabled;
        self.mcp_tools = tools;
        self
    }

    fn session(&self) -> &SharedState {
        self.agent.state()
    }
}

pub type SharedGatewayState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedGatewayState) -> Router {
    Router::new()
        .route("/event", post(event_handler))
        .route("/event/stream", post(event_stream_handler))
        .route("/health", get(health_handler))
        .route("/agent/status", get(status_handler))
        .route("/agent/reset", post(reset_handler))
        .route("/process/register", post(register_process_handler))
        .route("/process/unregister", post(unregister_process_handler))
        .route("/mcp/status", get(mcp_status_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Provider, tools and session state are built once; every request shares
/// them through the router state.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = hintloop_providers::build_from_config(&config)?;
    let toolset = hintloop_tools::build_toolset(&config).await?;
    let tools = Arc::new(toolset.registry);
    let agent = AgentLoop::from_config(&config, provider, tools, SharedState::default());
    let cwd = agent.state().lock().await.current_dir.clone();
    let conversation =
        Conversation::with_system_prompt(hintloop_agent::system_prompt(&config, &cwd).await);

    let state = Arc::new(
        GatewayState::new(agent, conversation).with_mcp(config.mcp.enabled, toolset.mcp_tools),
    );
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl ErrorResponse {
    fn bad_gateway(error: impl std::fmt::Display) -> Response {
        (
            StatusCode::BAD_GATEWAY,
            Json(Self {
                success: false,
                error: error.to_string(),
            }),
        )
            .into_response()
    }

    fn internal(error: impl std::fmt::Display) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self {
                success: false,
                error: error.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct EventResult {
    final_answer: String,
    iterations: u32,
    tool_calls_count: usize,
    success: bool,
    todo_items: usize,
    trajectory_file: Option<String>,
}

#[derive(Serialize)]
struct EventResponse {
    success: bool,
    event_id: String,
    result: EventResult,
}

/// `POST /event`: Run the agent on one inbound event.
async fn event_handler(
    State(state): State<SharedGatewayState>,
    Json(event): Json<InboundEvent>,
) -> Response {
    let event_id = uuid::Uuid::new_v4().to_string();
    info!(event_id = %event_id, event_type = %event.event_type, "Event received");

    let input = event.to_user_message();
    // Detached from the request: a client disconnect must not cut a run
    // between a tool call and its result.
    let run_state = state.clone();
    let run = tokio::spawn(async move {
        let mut conversation = run_state.conversation.lock().await;
        run_state.agent.run(&mut conversation, &input).await
    });
    let outcome = match run.await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(event_id = %event_id, error = %e, "Agent run failed");
            return ErrorResponse::bad_gateway(e);
        }
        Err(e) => {
            error!(event_id = %event_id, error = %e, "Agent task aborted");
            return ErrorResponse::internal(e);
        }
    };

    let result = event_result(&state, outcome).await;
    Json(EventResponse {
        success: true,
        event_id,
        result,
    })
    .into_response()
}

async fn event_result(state: &GatewayState, outcome: RunOutcome) -> EventResult {
    let todo_items = state.session().lock().await.todos.len();
    EventResult {
        final_answer: outcome.final_answer,
        iterations: outcome.iterations,
        tool_calls_count: outcome.tool_calls_count,
        success: outcome.success,
        todo_items,
        trajectory_file: state
            .agent
            .trajectory()
            .path()
            .map(|p| p.display().to_string()),
    }
}

/// `POST /event/stream`: Run the agent on one event, streaming progress as SSE.
async fn event_stream_handler(
    State(state): State<SharedGatewayState>,
    Json(event): Json<InboundEvent>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    info!(event_type = %event.event_type, "Streaming event received");

    let (tx, rx) = mpsc::channel::<AgentStreamEvent>(64);
    let input = event.to_user_message();
    tokio::spawn(async move {
        let mut conversation = state.conversation.lock().await;
        // Failures already reached the client as an `error` event.
        if let Err(e) = state
            .agent
            .run_observed(&mut conversation, &input, Some(tx))
            .await
        {
            error!(error = %e, "Streaming agent run failed");
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let event_type = event.event_type().to_string();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Sse::new(stream)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    agent_initialized: bool,
    tools_count: usize,
    timestamp: String,
}

async fn health_handler(State(state): State<SharedGatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        agent_initialized: true,
        tools_count: state.agent.tools().len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
struct StatusResponse {
    provider: String,
    model: String,
    tool_calls_count: u32,
    todo_items: usize,
    current_directory: String,
    background_processes: usize,
    mcp_tools_count: usize,
}

/// `GET /agent/status`: Session summary.
async fn status_handler(State(state): State<SharedGatewayState>) -> Json<StatusResponse> {
    let session = state.session().lock().await;
    Json(StatusResponse {
        provider: state.agent.provider_name().to_string(),
        model: state.agent.model().to_string(),
        tool_calls_count: session.total_tool_calls,
        todo_items: session.todos.len(),
        current_directory: session.current_dir.display().to_string(),
        background_processes: session.background_processes.len(),
        mcp_tools_count: state.mcp_tools.len(),
    })
}

#[derive(Serialize)]
struct AckResponse {
    success: bool,
    message: String,
}

/// `POST /agent/reset`: Forget the conversation (keeping the system
/// prompt) and all session state.
async fn reset_handler(State(state): State<SharedGatewayState>) -> Json<AckResponse> {
    state.conversation.lock().await.clear_history();
    state.session().reset().await;
    info!("Agent state reset");
    Json(AckResponse {
        success: true,
        message: "Agent state reset successfully".into(),
    })
}

#[derive(Deserialize)]
struct RegisterProcessRequest {
    process_id: String,
    process_name: String,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

async fn register_process_handler(
    State(state): State<SharedGatewayState>,
    Json(payload): Json<RegisterProcessRequest>,
) -> Json<AckResponse> {
    state.session().lock().await.register_process(
        &payload.process_id,
        &payload.process_name,
        payload.metadata,
    );
    info!(process_id = %payload.process_id, "Background process registered");
    Json(AckResponse {
        success: true,
        message: format!("Process {} registered", payload.process_id),
    })
}

#[derive(Deserialize)]
struct UnregisterProcessRequest {
    process_id: String,
}

async fn unregister_process_handler(
    State(state): State<SharedGatewayState>,
    Json(payload): Json<UnregisterProcessRequest>,
) -> Json<AckResponse> {
    let removed = state
        .session()
        .lock()
        .await
        .unregister_process(&payload.process_id);
    let message = if removed {
        format!("Process {} unregistered", payload.process_id)
    } else {
        format!("Process {} not found", payload.process_id)
    };
    Json(AckResponse {
        success: removed,
        message,
    })
}

#[derive(Serialize)]
struct McpStatusResponse {
    enabled: bool,
    tools_count: usize,
    tools: Vec<String>,
}

async fn mcp_status_handler(State(state): State<SharedGatewayState>) -> Json<McpStatusResponse> {
    Json(McpStatusResponse {
        enabled: state.mcp_enabled,
        tools_count: state.mcp_tools.len(),
        tools: state.mcp_tools.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use hintloop_core::error::{ProviderError, ToolError};
    use hintloop_core::message::{Message, MessageToolCall, Role};
    use hintloop_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use hintloop_core::state::SessionState;
    use hintloop_core::tool::{Tool, ToolRegistry, ToolResult};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Answers every request with the same text, or fails when `None`.
    struct FixedProvider(Option<&'static str>);

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            match self.0 {
                Some(text) => Ok(ProviderResponse {
                    message: Message::assistant(text),
                    usage: None,
                    model: "fixed-model".into(),
                }),
                None => Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "upstream down".into(),
                }),
            }
        }
    }

    /// Asks for one `wait` call, then answers once the result is in.
    struct WaitThenAnswer;

    #[async_trait]
    impl Provider for WaitThenAnswer {
        fn name(&self) -> &str {
            "wait-then-answer"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let after_tool = request.messages.last().is_some_and(|m| m.role == Role::Tool);
            let message = if after_tool {
                Message::assistant("FINAL ANSWER: waited")
            } else {
                Message::assistant_with_tools(
                    "",
                    vec![MessageToolCall { id: "w1".into(), name: "wait".into(), arguments: "{}".into() }],
                )
            };
            Ok(ProviderResponse { message, usage: None, model: "m".into() })
        }
    }

    /// Signals when it starts, then takes a while.
    struct WaitTool(Arc<tokio::sync::Notify>);

    #[async_trait]
    impl Tool for WaitTool {
        fn name(&self) -> &str { "wait" }
        fn description(&self) -> &str { "Wait a bit" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({"type": "object"}) }
        async fn execute(&self, _arguments: serde_json::Value, _state: &mut SessionState) -> Result<ToolResult, ToolError> {
            self.0.notify_one();
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            Ok(ToolResult::ok(serde_json::json!({"waited": true})))
        }
    }

    fn test_state(reply: Option<&'static str>) -> SharedGatewayState {
        let agent = AgentLoop::new(
            Arc::new(FixedProvider(reply)),
            "fixed-model",
            Arc::new(ToolRegistry::new()),
            SharedState::new(SessionState::new("/srv")),
        );
        Arc::new(
            GatewayState::new(agent, Conversation::with_system_prompt("sys"))
                .with_mcp(true, vec!["files_read".into()]),
        )
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(Some("hi")));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tools_count"], 0);
    }

    #[tokio::test]
    async fn event_runs_agent() {
        let state = test_state(Some("FINAL ANSWER: pong"));
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_json(
                "/event",
                serde_json::json!({"type": "im_message", "content": "ping", "metadata": {"sender": "bob"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["final_answer"], "pong");
        assert_eq!(body["result"]["iterations"], 1);
        assert!(body["result"]["trajectory_file"].is_null());
        assert!(!body["event_id"].as_str().unwrap().is_empty());

        let conversation = state.conversation.lock().await;
        assert_eq!(conversation.messages[1].text(), "[IM from bob] ping");
    }

    #[tokio::test]
    async fn client_disconnect_mid_batch_keeps_conversation_whole() {
        let started = Arc::new(tokio::sync::Notify::new());
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(WaitTool(started.clone()))).unwrap();
        let agent = AgentLoop::new(
            Arc::new(WaitThenAnswer),
            "m",
            Arc::new(registry),
            SharedState::new(SessionState::new("/srv")),
        );
        let state = Arc::new(GatewayState::new(agent, Conversation::with_system_prompt("sys")));

        let request = tokio::spawn(
            build_router(state.clone())
                .oneshot(post_json("/event", serde_json::json!({"type": "web_message", "content": "go"}))),
        );
        started.notified().await;
        request.abort();
        let _ = request.await;

        {
            // waits for the detached run to finish
            let conversation = state.conversation.lock().await;
            assert_eq!(conversation.len(), 5);
            let answered = conversation
                .messages
                .iter()
                .any(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some("w1"));
            assert!(answered);
            assert_eq!(conversation.messages[4].text(), "FINAL ANSWER: waited");
        }

        let response = build_router(state)
            .oneshot(post_json("/event", serde_json::json!({"type": "web_message", "content": "again"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn provider_failure_is_bad_gateway() {
        let app = build_router(test_state(None));
        let response = app
            .oneshot(post_json("/event", serde_json::json!({"type": "web_message", "content": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("upstream down"));
    }

    #[tokio::test]
    async fn unknown_event_type_rejected() {
        let app = build_router(test_state(Some("x")));
        let response = app
            .oneshot(post_json("/event", serde_json::json!({"type": "fax", "content": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn event_stream_returns_sse() {
        let app = build_router(test_state(Some("FINAL ANSWER: streamed")));
        let response = app
            .oneshot(post_json("/event/stream", serde_json::json!({"type": "web_message", "content": "go"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        assert!(content_type.contains("text/event-stream"), "got '{content_type}'");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("event: iteration_start"));
        assert!(text.contains("event: chunk"));
        assert!(text.contains("event: done"), "missing done event: {text}");
    }

    #[tokio::test]
    async fn process_registration_shows_in_status() {
        let state = test_state(Some("x"));

        let response = build_router(state.clone())
            .oneshot(post_json(
                "/process/register",
                serde_json::json!({"process_id": "p1", "process_name": "build", "metadata": {"pid": 42}}),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["success"], true);

        let req = Request::builder().uri("/agent/status").body(Body::empty()).unwrap();
        let status = json_body(build_router(state.clone()).oneshot(req).await.unwrap()).await;
        assert_eq!(status["background_processes"], 1);
        assert_eq!(status["provider"], "fixed");
        assert_eq!(status["current_directory"], "/srv");
        assert_eq!(status["mcp_tools_count"], 1);

        let response = build_router(state.clone())
            .oneshot(post_json("/process/unregister", serde_json::json!({"process_id": "p1"})))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["success"], true);

        let response = build_router(state)
            .oneshot(post_json("/process/unregister", serde_json::json!({"process_id": "p1"})))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn reset_clears_session() {
        let state = test_state(Some("done"));
        build_router(state.clone())
            .oneshot(post_json("/event", serde_json::json!({"type": "web_message", "content": "hi"})))
            .await
            .unwrap();
        state.session().lock().await.todos.rewrite(["x"]);

        let response = build_router(state.clone())
            .oneshot(post_json("/agent/reset", serde_json::json!({})))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["message"], "Agent state reset successfully");

        let conversation = state.conversation.lock().await;
        assert_eq!(conversation.len(), 1);
        assert!(state.session().lock().await.todos.is_empty());
    }

    #[tokio::test]
    async fn mcp_status_lists_tools() {
        let req = Request::builder().uri("/mcp/status").body(Body::empty()).unwrap();
        let body = json_body(build_router(test_state(None)).oneshot(req).await.unwrap()).await;
        assert_eq!(body["enabled"], true);
        assert_eq!(body["tools"], serde_json::json!(["files_read"]));
    }
}
