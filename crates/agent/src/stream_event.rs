//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps provider-level stream chunks and loop progress
//! into higher-level events that the gateway forwards to clients over SSE
//! and the CLI prints as they arrive.

use serde::{Deserialize, Serialize};

/// Events emitted by the agent while a run is in progress.
///
/// - `iteration_start` / `iteration_end`: one provider round trip
/// - `chunk`: partial text token from the LLM
/// - `tool_call`: agent is invoking a tool
/// - `tool_result`: tool execution completed
/// - `max_iterations_reached`: the run hit its iteration ceiling
/// - `done`: the run is over, with its outcome
/// - `error`: the provider request failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    IterationStart { iteration: u32, max_iterations: u32 },

    /// Partial text token from the LLM.
    Chunk { content: String },

    /// The agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
        call_number: u32,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        success: bool,
        content: String,
        duration_ms: u64,
    },

    IterationEnd { iteration: u32 },

    MaxIterationsReached { iterations: u32, message: String },

    /// The run finished.
    Done {
        final_answer: String,
        success: bool,
        iterations: u32,
        tool_calls_count: usize,
    },

    /// An error ended the run.
    Error { message: String },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::IterationStart { .. } => "iteration_start",
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::IterationEnd { .. } => "iteration_end",
            Self::MaxIterationsReached { .. } => "max_iterations_reached",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_chunk() {
        let event = AgentStreamEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn event_serialization_tool_call() {
        let event = AgentStreamEvent::ToolCall {
            id: "call_1".into(),
            name: "execute_command".into(),
            arguments: serde_json::json!({"command": "ls"}),
            call_number: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["arguments"]["command"], "ls");
        assert_eq!(json["call_number"], 2);
    }

    #[test]
    fn type_tag_matches_event_type() {
        let events = vec![
            AgentStreamEvent::IterationStart { iteration: 1, max_iterations: 3 },
            AgentStreamEvent::IterationEnd { iteration: 1 },
            AgentStreamEvent::MaxIterationsReached { iterations: 3, message: "m".into() },
            AgentStreamEvent::Done {
                final_answer: "x".into(),
                success: true,
                iterations: 1,
                tool_calls_count: 0,
            },
            AgentStreamEvent::Error { message: "boom".into() },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn terminal_events() {
        assert!(AgentStreamEvent::Error { message: "x".into() }.is_terminal());
        assert!(!AgentStreamEvent::IterationEnd { iteration: 1 }.is_terminal());
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"chunk","content":"hi"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, AgentStreamEvent::Chunk { content: "hi".into() });
    }
}
