//! Configuration loading, validation, and management for hintloop.
//!
//! Loads configuration from `~/.hintloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// System prompt used when `[agent].system_prompt` is not set.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an event-driven assistant with tools for files, code execution and shell commands.

Events reach you from web and IM messages, email replies, GitHub notifications, timers and system reminders. Each user message is prefixed with its source; acknowledge it in your reply.

Planning:
- For work with three or more steps, create a TODO list with `rewrite_todo_list` first.
- Mark an item `in_progress` with `update_todo_status` before working on it and `completed` right after. Keep one item in progress at a time.
- Cancel items that no longer apply and add new ones when the approach changes. Refer to items by id.

Context you are given:
- Timestamps on messages and tool results show how time passes.
- "Tool call #N" counters show repetition. A high number means you should change strategy.
- Failed tools report the error category, your arguments and suggestions. Use them.
- The SYSTEM STATE block shows the current directory, platform and background processes.

When all work is done, write a line starting with "FINAL ANSWER:" followed by a summary of what was accomplished."#;

/// Appended to the system prompt when the knowledge base tools are enabled
/// and `[agent].require_citations` is on.
pub const CITATION_PROMPT: &str = r#"Knowledge base:
- Answer questions about the knowledge base only from what `knowledge_base_search` and `get_document` return. If the information is not there, say that you cannot answer from the available knowledge.
- Search more than once with different queries when one search is not enough, and fetch whole documents when a chunk lacks context.
- Cite every claim inline as [Doc: document_id] or [Chunk: chunk_id].
- Never make up information. Say so explicitly when something is unclear or not found."#;

/// The root configuration structure.
///
/// Maps directly to `~/.hintloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM provider, selected once at startup
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name passed to the provider
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub hints: HintsConfig,

    #[serde(default)]
    pub trajectory: TrajectoryConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("providers", &self.providers)
            .field("agent", &self.agent)
            .field("hints", &self.hints)
            .field("trajectory", &self.trajectory)
            .field("tools", &self.tools)
            .field("mcp", &self.mcp)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Iteration ceiling per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Most recent messages re-submitted across runs (0 = unlimited)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Replaces the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Add citation rules to the prompt when the knowledge base is configured
    #[serde(default = "default_true")]
    pub require_citations: bool,

    /// Add branch, status and recent commits of the working directory
    #[serde(default)]
    pub git_context: bool,
}

fn default_max_iterations() -> u32 {
    20
}
fn default_history_limit() -> usize {
    40
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_limit: default_history_limit(),
            system_prompt: None,
            require_citations: true,
            git_context: false,
        }
    }
}

impl AgentConfig {
    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

/// Which context hints the loop injects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintsConfig {
    /// Prefix user input and tool results with a timestamp
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Prefix tool results with "Tool call #N"
    #[serde(default = "default_true")]
    pub tool_counter: bool,

    /// Include the TODO list in the system hint
    #[serde(default = "default_true")]
    pub todo_list: bool,

    /// Verbose tool failure messages with arguments and suggestions
    #[serde(default = "default_true")]
    pub detailed_errors: bool,

    /// Include the SYSTEM STATE block in the system hint
    #[serde(default = "default_true")]
    pub system_state: bool,

    /// chrono format string for timestamps
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S".into()
}

impl Default for HintsConfig {
    fn default() -> Self {
        Self {
            timestamps: true,
            tool_counter: true,
            todo_list: true,
            detailed_errors: true,
            system_state: true,
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl HintsConfig {
    /// Every hint switched off.
    pub fn disabled() -> Self {
        Self {
            timestamps: false,
            tool_counter: false,
            todo_list: false,
            detailed_errors: false,
            system_state: false,
            timestamp_format: default_timestamp_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_trajectory_path")]
    pub path: PathBuf,
}

fn default_trajectory_path() -> PathBuf {
    PathBuf::from("trajectory.json")
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_trajectory_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub code_timeout_secs: u64,

    /// Interpreter for `code_interpreter`
    #[serde(default = "default_python")]
    pub python: String,

    /// Base URL of the retrieval service; enables the knowledge base tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base_url: Option<String>,

    #[serde(default = "default_top_k")]
    pub knowledge_base_top_k: u32,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_python() -> String {
    "python3".into()
}
fn default_top_k() -> u32 {
    5
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_timeout_secs(),
            code_timeout_secs: default_timeout_secs(),
            python: default_python(),
            knowledge_base_url: None,
            knowledge_base_top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Per-request timeout for MCP subprocesses
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_timeout_secs(),
            servers: vec![],
        }
    }
}

/// An MCP server launched over stdio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Prefix for the proxied tool names
    pub name: String,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.hintloop/config.toml).
    ///
    /// Environment overrides:
    /// - `HINTLOOP_API_KEY`, then the provider-specific
    ///   `OPENROUTER_API_KEY` / `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`
    /// - `HINTLOOP_PROVIDER`, `HINTLOOP_MODEL`
    /// - `AGENT_PORT`, `ENABLE_MCP_TOOLS`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("HINTLOOP_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = lookup("HINTLOOP_MODEL") {
            self.model = model;
        }

        if self.api_key.is_none() {
            let vendor_key = match self.provider.as_str() {
                "anthropic" => "ANTHROPIC_API_KEY",
                "openai" => "OPENAI_API_KEY",
                _ => "OPENROUTER_API_KEY",
            };
            self.api_key = lookup("HINTLOOP_API_KEY").or_else(|| lookup(vendor_key));
        }

        if let Some(port) = lookup("AGENT_PORT") {
            match port.parse() {
                Ok(p) => self.gateway.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid AGENT_PORT"),
            }
        }

        if let Some(flag) = lookup("ENABLE_MCP_TOOLS") {
            self.mcp.enabled = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".hintloop")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.tools.command_timeout_secs == 0
            || self.tools.code_timeout_secs == 0
            || self.mcp.timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "tool and MCP timeouts must be greater than 0".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.mcp.servers {
            if server.name.trim().is_empty() || server.command.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "every mcp server needs a name and a command".into(),
                ));
            }
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate mcp server name: {}",
                    server.name
                )));
            }
        }

        Ok(())
    }

    /// API key for the active provider: the per-provider entry wins.
    pub fn provider_api_key(&self) -> Option<String> {
        self.providers
            .get(&self.provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Model for the active provider: the per-provider entry wins.
    pub fn provider_model(&self) -> String {
        self.providers
            .get(&self.provider)
            .and_then(|p| p.model.clone())
            .unwrap_or_else(|| self.model.clone())
    }

    /// The agent's system prompt, with the citation rules appended when the
    /// knowledge base tools are registered.
    pub fn system_prompt(&self) -> String {
        let base = self.agent.system_prompt();
        if self.agent.require_citations && self.tools.knowledge_base_url.is_some() {
            format!("{base}\n\n{CITATION_PROMPT}")
        } else {
            base.to_string()
        }
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider_api_key().is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            agent: AgentConfig::default(),
            hints: HintsConfig::default(),
            trajectory: TrajectoryConfig::default(),
            tools: ToolsConfig::default(),
            mcp: McpConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
