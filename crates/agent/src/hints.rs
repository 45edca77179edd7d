//! Context hints injected around the conversation.
//!
//! Timestamps on user input and tool results, per-tool call counters, and
//! the system hint (environment state plus TODO list) that is appended to
//! every request as a fresh user message. The hint is never stored in the
//! conversation itself.

use std::fmt::Write as _;

use chrono::Local;
use hintloop_config::HintsConfig;
use hintloop_core::state::SessionState;
use hintloop_core::tool::{ToolCall, ToolFailure};

#[derive(Debug, Clone)]
pub struct HintBuilder {
    config: HintsConfig,
}

impl HintBuilder {
    pub fn new(config: HintsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HintsConfig {
        &self.config
    }

    /// Current local time in the configured format. An invalid format
    /// string falls back to RFC 3339.
    pub fn timestamp(&self) -> String {
        let now = Local::now();
        let mut out = String::new();
        if write!(out, "{}", now.format(&self.config.timestamp_format)).is_err() {
            return now.to_rfc3339();
        }
        out
    }

    /// The user turn as it is stored: `[time] input` when timestamps are on.
    pub fn stamp_input(&self, input: &str) -> String {
        if self.config.timestamps {
            format!("[{}] {input}", self.timestamp())
        } else {
            input.to_string()
        }
    }

    /// Per-tool call number shown to the model. Counters always advance;
    /// the number is pinned to 1 when the counter hint is off.
    pub fn call_number(&self, state: &mut SessionState, tool_name: &str) -> u32 {
        let count = state.record_tool_call(tool_name);
        if self.config.tool_counter { count } else { 1 }
    }

    /// Prefix a tool-result body with its timestamp and call counter.
    pub fn tool_content(&self, call_number: u32, tool_name: &str, body: &str) -> String {
        let mut tags = Vec::new();
        if self.config.timestamps {
            tags.push(format!("[{}]", self.timestamp()));
        }
        if self.config.tool_counter {
            tags.push(format!("[Tool call #{call_number} for '{tool_name}']"));
        }
        if tags.is_empty() {
            body.to_string()
        } else {
            format!("{}\n{body}", tags.join(" "))
        }
    }

    /// Failure text for the model, verbose when detailed errors are on.
    pub fn error_text(&self, call: &ToolCall, failure: &ToolFailure) -> String {
        if !self.config.detailed_errors {
            return failure.message.clone();
        }
        let arguments = serde_json::to_string_pretty(&call.arguments)
            .unwrap_or_else(|_| call.arguments.to_string());
        let mut text = format!(
            "Tool '{}' failed with {}: {}\nArguments: {arguments}",
            call.name, failure.kind, failure.message
        );
        if let Some(suggestion) = &failure.suggestion {
            text.push_str("\nSuggestions: ");
            text.push_str(suggestion);
        }
        text
    }

    /// The system hint for the next request, if any part of it is enabled
    /// and non-empty.
    pub fn system_hint(&self, state: &SessionState) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();

        if self.config.system_state {
            parts.push("=== SYSTEM STATE ===".into());
            parts.push(format!("Current Time: {}", self.timestamp()));
            parts.push(format!("Current Directory: {}", state.current_dir.display()));
            parts.push(format!(
                "System: {} ({})",
                std::env::consts::OS,
                std::env::consts::ARCH
            ));
            parts.push(format!("Shell Environment: {}", shell_environment()));
            if !state.background_processes.is_empty() {
                parts.push(format!(
                    "Background Processes: {} active",
                    state.background_processes.len()
                ));
            }
            parts.push(String::new());
        }

        if self.config.todo_list && !state.todos.is_empty() {
            parts.push("=== CURRENT TASKS ===".into());
            parts.push(state.todos.render());
            parts.push(String::new());
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

fn shell_environment() -> String {
    match std::env::consts::OS {
        "windows" => "Windows Command Prompt or PowerShell".into(),
        "macos" => "macOS Terminal (zsh/bash)".into(),
        _ => format!(
            "Linux Shell ({})",
            std::env::var("SHELL").unwrap_or_else(|_| "bash".into())
        ),
    }
}
