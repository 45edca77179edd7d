//! LLM Provider implementations for hintloop.
//!
//! All providers implement the `hintloop_core::Provider` trait. Streaming
//! adapters share the SSE plumbing in [`sse`] and buffer tool-call
//! fragments in a [`ToolCallAccumulator`] until each call is complete.

pub mod accumulator;
pub mod anthropic;
mod http;
pub mod openai_compat;
pub mod router;
pub mod sse;

pub use accumulator::ToolCallAccumulator;
pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
