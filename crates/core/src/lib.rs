//! # hintloop Core
//!
//! Domain types, traits, and error definitions for the hintloop agent loop.
//! This crate has no framework dependencies; every other crate implements
//! against the model defined here.
//!
//! ## Design Philosophy
//!
//! The seams are traits: [`Provider`] for LLM backends and [`Tool`] for
//! capabilities. Implementations live in their own crates, which keeps the
//! loop testable with scripted providers and in-memory tools.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod state;
pub mod tool;
pub mod trigger;

// Re-export key types at crate root for ergonomics
pub use error::{DuplicateToolError, Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{
    NormalizedResponse, Provider, ProviderRequest, ProviderResponse, ResponseAssembler,
    StreamChunk, ToolDefinition, Usage, COMPLETION_MARKER,
};
pub use state::{BackgroundProcess, SessionState, SharedState, TodoItem, TodoList, TodoStatus};
pub use tool::{Tool, ToolCall, ToolFailure, ToolRegistry, ToolResult};
pub use trigger::{EventType, InboundEvent};
