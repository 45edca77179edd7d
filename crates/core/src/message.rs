//! Message and Conversation domain types.
//!
//! A conversation is the transcript that gets sent to the provider on every
//! iteration: system prompt, user input, assistant turns (optionally carrying
//! tool calls) and the tool results that answer them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (or an inbound event rendered as user text)
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content. `None` for assistant turns that only carry tool calls.
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls requested by the assistant, in emission order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Set on tool results that report a failed call
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(role: Role, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::build(Role::User, Some(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message that requests tool calls.
    ///
    /// Empty text is stored as `None` so providers see a tool-only turn.
    pub fn assistant_with_tools(content: impl Into<String>, calls: Vec<MessageToolCall>) -> Self {
        let content = content.into();
        let mut msg = Self::build(
            Role::Assistant,
            if content.is_empty() { None } else { Some(content) },
        );
        msg.tool_calls = calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::build(Role::System, Some(content.into()))
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::build(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Create a tool result message for a call that failed.
    pub fn tool_error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::tool_result(tool_call_id, content);
        msg.is_error = true;
        msg
    }

    /// The text content, or an empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// A tool call embedded in an assistant message (wire shape: arguments are
/// a JSON-encoded string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Provider-assigned call ID
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

/// A conversation is an ordered sequence of messages with shared context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a conversation seeded with a system prompt.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.push(Message::system(prompt));
        conv
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop everything except a leading system message.
    pub fn clear_history(&mut self) {
        let system = self
            .messages
            .first()
            .filter(|m| m.role == Role::System)
            .cloned();
        self.messages.clear();
        self.messages.extend(system);
        self.updated_at = Utc::now();
    }

    /// The messages to re-submit when the context is bounded.
    ///
    /// Keeps a leading system message plus the last `limit` other messages.
    /// The window never opens on a tool result whose assistant call was cut
    /// off. `limit == 0` means unlimited.
    pub fn window(&self, limit: usize) -> Vec<Message> {
        let (system, rest) = match self.messages.first() {
            Some(first) if first.role == Role::System => (Some(first), &self.messages[1..]),
            _ => (None, &self.messages[..]),
        };

        let mut start = if limit == 0 || rest.len() <= limit {
            0
        } else {
            rest.len() - limit
        };
        while start < rest.len() && rest[start].role == Role::Tool {
            start += 1;
        }

        system
            .into_iter()
            .cloned()
            .chain(rest[start..].iter().cloned())
            .collect()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn tool_only_assistant_turn_has_no_content() {
        let call = MessageToolCall {
            id: "call_1".into(),
            name: "list_files".into(),
            arguments: "{}".into(),
        };
        let msg = Message::assistant_with_tools("", vec![call]);
        assert!(msg.content.is_none());
        assert_eq!(msg.text(), "");
        assert_eq!(msg.tool_calls.len(), 1);
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Message::user("First message"));
        assert_eq!(conv.len(), 1);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn message_serialization_keeps_null_content() {
        let msg = Message::assistant_with_tools("", vec![]);
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json["content"].is_null());
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.role, Role::Assistant);
        assert!(back.content.is_none());
    }

    #[test]
    fn window_keeps_system_prompt_and_tail() {
        let mut conv = Conversation::with_system_prompt("sys");
        for i in 0..10 {
            conv.push(Message::user(format!("u{i}")));
        }
        let window = conv.window(3);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].role, Role::System);
        assert_eq!(window[1].text(), "u7");
        assert_eq!(window[3].text(), "u9");
    }

    #[test]
    fn window_skips_orphaned_tool_results() {
        let mut conv = Conversation::with_system_prompt("sys");
        conv.push(Message::user("list"));
        conv.push(Message::assistant_with_tools(
            "",
            vec![
                MessageToolCall { id: "a".into(), name: "t".into(), arguments: "{}".into() },
                MessageToolCall { id: "b".into(), name: "t".into(), arguments: "{}".into() },
            ],
        ));
        conv.push(Message::tool_result("a", "1"));
        conv.push(Message::tool_result("b", "2"));
        conv.push(Message::assistant("done"));

        let window = conv.window(2);
        // [tool b, assistant] would orphan "b"; the window starts at the answer.
        assert_eq!(window.len(), 2);
        assert_eq!(window[1].text(), "done");
    }

    #[test]
    fn window_zero_is_unlimited() {
        let mut conv = Conversation::new();
        for i in 0..5 {
            conv.push(Message::user(format!("{i}")));
        }
        assert_eq!(conv.window(0).len(), 5);
    }

    #[test]
    fn clear_history_keeps_system_prompt() {
        let mut conv = Conversation::with_system_prompt("sys");
        conv.push(Message::user("hi"));
        conv.clear_history();
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages[0].role, Role::System);
    }
}
