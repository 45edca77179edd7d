//! Inbound events that trigger an agent run.
//!
//! External systems (web UI, IM, email, GitHub, timers) and internal
//! reminders all arrive as an [`InboundEvent`], which is rendered into a
//! single user message before the run starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WebMessage,
    ImMessage,
    EmailReply,
    GithubPrUpdate,
    TimerTrigger,
    UserTimeout,
    ProcessTimeout,
    SystemAlert,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        Self::WebMessage,
        Self::ImMessage,
        Self::EmailReply,
        Self::GithubPrUpdate,
        Self::TimerTrigger,
        Self::UserTimeout,
        Self::ProcessTimeout,
        Self::SystemAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebMessage => "web_message",
            Self::ImMessage => "im_message",
            Self::EmailReply => "email_reply",
            Self::GithubPrUpdate => "github_pr_update",
            Self::TimerTrigger => "timer_trigger",
            Self::UserTimeout => "user_timeout",
            Self::ProcessTimeout => "process_timeout",
            Self::SystemAlert => "system_alert",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown event type: {s}"))
    }
}

/// An event delivered to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,

    pub content: String,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(event_type: EventType, content: impl Into<String>) -> Self {
        Self {
            event_type,
            content: content.into(),
            metadata: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    fn meta(&self, key: &str, default: &str) -> String {
        match self.metadata.get(key) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => default.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Render the event as the user message the agent sees.
    pub fn to_user_message(&self) -> String {
        let c = &self.content;
        match self.event_type {
            EventType::WebMessage => format!("[Web Interface] {c}"),
            EventType::ImMessage => format!("[IM from {}] {c}", self.meta("sender", "Unknown")),
            EventType::EmailReply => format!(
                "[Email Reply from {}]\nSubject: {}\n{c}",
                self.meta("from", "Unknown"),
                self.meta("subject", "No Subject")
            ),
            EventType::GithubPrUpdate => format!(
                "[GitHub PR #{} {}] {c}",
                self.meta("pr_number", "Unknown"),
                self.meta("action", "updated")
            ),
            EventType::TimerTrigger => {
                format!("[Timer {} triggered] {c}", self.meta("timer_id", "Unknown"))
            }
            EventType::UserTimeout => format!(
                "[System Reminder] User has not responded for {}. {c}",
                self.meta("duration", "unknown")
            ),
            EventType::ProcessTimeout => format!(
                "[System Alert] Background process {} has been running for {}. {c}",
                self.meta("process_id", "Unknown"),
                self.meta("duration", "unknown")
            ),
            EventType::SystemAlert => format!(
                "[System Alert: {}] {c}",
                self.meta("alert_type", "general")
            ),
        }
    }
}
