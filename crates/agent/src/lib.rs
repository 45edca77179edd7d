//! The agent loop.
//!
//! A run follows a **Request → Act → Observe** cycle:
//!
//! 1. **Receive** a user message (CLI, gateway, or an inbound event)
//! 2. **Build the request**: conversation window plus a fresh system hint
//! 3. **Send to the LLM** via the configured provider
//! 4. **If tool calls**: execute them in order, append results, loop back to step 2
//! 5. **Otherwise**: the answer after `FINAL ANSWER:`, or the plain text, ends the run
//!
//! Hitting the iteration ceiling ends the run without success. It is not
//! an error.

pub mod hints;
pub mod loop_runner;
pub mod prompt;
pub mod stream_event;
pub mod trajectory;

pub use hints::HintBuilder;
pub use loop_runner::{AgentLoop, MAX_ITERATIONS_MESSAGE, RunOutcome, TerminatedBy};
pub use prompt::{GitContext, system_prompt};
pub use stream_event::AgentStreamEvent;
pub use trajectory::{ToolCallRecord, TrajectoryError, TrajectoryRecord, TrajectoryRecorder};
