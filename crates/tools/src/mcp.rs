//! MCP stdio proxy tools.
//!
//! Every configured server is started once at discovery time to list its
//! tools; each remote tool becomes a local [`McpProxyTool`] named
//! `{server}_{tool}`. A call spawns a fresh server process, runs the
//! `initialize` handshake, sends `tools/call` and kills the process
//! afterwards. No session is reused between calls.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hintloop_config::McpServerConfig;
use hintloop_core::error::ToolError;
use hintloop_core::state::SessionState;
use hintloop_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MCP stdio error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCP server closed the connection")]
    Closed,

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP Error: {0}")]
    Server(String),

    #[error("MCP request timed out after {0} seconds")]
    Timeout(u64),
}

impl McpError {
    fn into_tool_error(self, tool_name: &str) -> ToolError {
        match self {
            Self::Timeout(secs) => ToolError::timeout(tool_name, secs, "MCP tool call"),
            Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ToolError::NotFound(format!("MCP server executable not found: {source}"))
            }
            other => ToolError::ExecutionFailed {
                tool_name: tool_name.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

/// One short-lived JSON-RPC session over a child's stdin/stdout.
struct StdioSession {
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: i64,
}

impl StdioSession {
    /// Spawn the server and complete the `initialize` handshake.
    async fn open(server: &McpServerConfig) -> Result<Self, McpError> {
        let mut cmd = Command::new(&server.command);
        cmd.args(&server.args)
            .envs(&server.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
            command: server.command.clone(),
            source,
        })?;
        let stdin = child.stdin.take().ok_or(McpError::Closed)?;
        let stdout = child.stdout.take().ok_or(McpError::Closed)?;

        let mut session = Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 1,
        };

        session
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "hintloop",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;
        session.notify("notifications/initialized").await?;
        Ok(session)
    }

    async fn write_line(&mut self, message: &Value) -> Result<(), McpError> {
        let line = format!("{message}\n");
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn notify(&mut self, method: &str) -> Result<(), McpError> {
        self.write_line(&json!({"jsonrpc": "2.0", "method": method, "params": {}}))
            .await
    }

    /// Send a request and wait for the response with the same id. Server
    /// notifications and unrelated lines are skipped.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id;
        self.next_id += 1;
        self.write_line(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await?;

        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line).await? == 0 {
                return Err(McpError::Closed);
            }
            let message: Value = match serde_json::from_str(line.trim()) {
                Ok(v) => v,
                Err(_) => {
                    debug!(line = %line.trim(), "Skipping non-JSON output from MCP server");
                    continue;
                }
            };
            if message["id"].as_i64() != Some(id) {
                continue;
            }
            if let Some(error) = message.get("error") {
                let text = error["message"].as_str().map(str::to_string);
                return Err(McpError::Server(text.unwrap_or_else(|| error.to_string())));
            }
            return message
                .get("result")
                .cloned()
                .ok_or_else(|| McpError::Protocol(format!("response to {method} has no result")));
        }
    }
}

async fn with_timeout<T>(
    secs: u64,
    fut: impl std::future::Future<Output = Result<T, McpError>>,
) -> Result<T, McpError> {
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .map_err(|_| McpError::Timeout(secs))?
}

/// List the tools of one server.
pub async fn list_tools(server: &McpServerConfig, timeout_secs: u64) -> Result<Vec<RemoteTool>, McpError> {
    with_timeout(timeout_secs, async {
        let mut session = StdioSession::open(server).await?;
        let result = session.request("tools/list", json!({})).await?;
        serde_json::from_value(result["tools"].clone())
            .map_err(|e| McpError::Protocol(format!("invalid tools/list result: {e}")))
    })
    .await
}

/// Call one tool on a freshly spawned server and return its text output.
pub async fn call_tool(
    server: &McpServerConfig,
    tool: &str,
    arguments: Value,
    timeout_secs: u64,
) -> Result<String, McpError> {
    with_timeout(timeout_secs, async {
        let mut session = StdioSession::open(server).await?;
        let result = session
            .request("tools/call", json!({"name": tool, "arguments": arguments}))
            .await?;

        let text = result["content"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if result["isError"].as_bool() == Some(true) {
            return Err(McpError::Server(text));
        }
        Ok(text)
    })
    .await
}

/// Local stand-in for one remote MCP tool.
pub struct McpProxyTool {
    server: Arc<McpServerConfig>,
    remote_name: String,
    name: String,
    description: String,
    schema: Value,
    timeout_secs: u64,
}

impl McpProxyTool {
    pub fn new(server: Arc<McpServerConfig>, remote: RemoteTool, timeout_secs: u64) -> Self {
        Self {
            name: format!("{}_{}", server.name, remote.name),
            description: remote.description.unwrap_or_else(|| remote.name.clone()),
            schema: remote
                .input_schema
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            remote_name: remote.name,
            server,
            timeout_secs,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server.name
    }
}

#[async_trait]
impl Tool for McpProxyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(
        &self,
        arguments: Value,
        _state: &mut SessionState,
    ) -> Result<ToolResult, ToolError> {
        debug!(server = %self.server.name, tool = %self.remote_name, "Calling MCP tool");
        let text = call_tool(&self.server, &self.remote_name, arguments, self.timeout_secs)
            .await
            .map_err(|e| e.into_tool_error(&self.name))?;
        Ok(ToolResult::ok(json!({"success": true, "result": text})))
    }
}

/// Discover proxy tools for every server. A server that fails to start or
/// list its tools is skipped.
pub async fn discover(servers: &[McpServerConfig], timeout_secs: u64) -> Vec<McpProxyTool> {
    let mut tools = Vec::new();
    for server in servers {
        let server = Arc::new(server.clone());
        match list_tools(&server, timeout_secs).await {
            Ok(remote) => {
                info!(server = %server.name, tools = remote.len(), "Connected to MCP server");
                tools.extend(
                    remote
                        .into_iter()
                        .map(|r| McpProxyTool::new(Arc::clone(&server), r, timeout_secs)),
                );
            }
            Err(e) => warn!(server = %server.name, error = %e, "Skipping MCP server"),
        }
    }
    tools
}
