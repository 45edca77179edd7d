//! Tool-call accumulator for streamed responses.
//!
//! Providers deliver a tool call's arguments as many small fragments, each
//! tagged with the per-response index of the call. Fragments are buffered
//! per index and a call is only handed out once its block is closed, either
//! explicitly (Anthropic `content_block_stop`) or at the end of the
//! response (OpenAI `finish_reason` / `[DONE]`).

use std::collections::BTreeMap;

use hintloop_core::message::MessageToolCall;
use tracing::warn;

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialCall {
    fn into_call(self, index: u32) -> MessageToolCall {
        let id = if self.id.is_empty() {
            format!("call_{index}_{}", uuid::Uuid::new_v4().simple())
        } else {
            self.id
        };
        MessageToolCall {
            id,
            name: self.name,
            arguments: self.arguments,
        }
    }
}

/// Buffers tool call fragments keyed by index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    open: BTreeMap<u32, PartialCall>,
    closed: BTreeMap<u32, MessageToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or update) the call at `index`. Empty values never overwrite
    /// values seen earlier.
    pub fn start(&mut self, index: u32, id: Option<&str>, name: Option<&str>) {
        if self.closed.contains_key(&index) {
            warn!(index, "Tool call block reopened after close, ignoring");
            return;
        }
        let call = self.open.entry(index).or_default();
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            call.id = id.to_string();
        }
        if let Some(name) = name.filter(|s| !s.is_empty()) {
            call.name = name.to_string();
        }
    }

    /// Append an argument fragment to the call at `index`.
    pub fn append(&mut self, index: u32, fragment: &str) {
        if self.closed.contains_key(&index) {
            warn!(index, "Argument fragment for closed tool call, ignoring");
            return;
        }
        self.open.entry(index).or_default().arguments.push_str(fragment);
    }

    /// Close the block at `index`, returning the completed call if it was a
    /// tool call.
    pub fn close(&mut self, index: u32) -> Option<MessageToolCall> {
        let call = self.open.remove(&index)?.into_call(index);
        self.closed.insert(index, call.clone());
        Some(call)
    }

    /// Close every open block and return all calls not yet handed out via
    /// [`close`](Self::close), ordered by index.
    pub fn close_all(&mut self) -> Vec<MessageToolCall> {
        let open = std::mem::take(&mut self.open);
        let mut out = Vec::with_capacity(open.len());
        for (index, partial) in open {
            let call = partial.into_call(index);
            self.closed.insert(index, call.clone());
            out.push(call);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_join_into_one_call() {
        let mut acc = ToolCallAccumulator::new();
        acc.start(0, Some("call_1"), Some("knowledge_base_search"));
        acc.append(0, r#"{"query":"#);
        acc.append(0, r#""hello"}"#);

        let calls = acc.close_all();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        let args: serde_json::Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(args, serde_json::json!({"query": "hello"}));
    }

    #[test]
    fn interleaved_indices_come_out_sorted() {
        let mut acc = ToolCallAccumulator::new();
        acc.start(1, Some("b"), Some("second"));
        acc.start(0, Some("a"), Some("first"));
        acc.append(1, "{}");
        acc.append(0, "{");
        acc.append(0, "}");

        let names: Vec<String> = acc.close_all().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn explicit_close_hands_out_once() {
        let mut acc = ToolCallAccumulator::new();
        acc.start(2, Some("x"), Some("read_file"));
        acc.append(2, r#"{"file_path":"a"}"#);
        let call = acc.close(2).unwrap();
        assert_eq!(call.name, "read_file");

        // late fragments are dropped and nothing is returned twice
        acc.append(2, "garbage");
        assert!(acc.close_all().is_empty());
        assert!(acc.close(2).is_none());
    }

    #[test]
    fn closing_a_text_block_yields_nothing() {
        let mut acc = ToolCallAccumulator::new();
        assert!(acc.close(0).is_none());
    }

    #[test]
    fn later_empty_id_does_not_clobber() {
        let mut acc = ToolCallAccumulator::new();
        acc.start(0, Some("call_9"), Some("t"));
        acc.start(0, Some(""), None);
        assert_eq!(acc.close_all()[0].id, "call_9");
    }

    #[test]
    fn missing_id_is_synthesized() {
        let mut acc = ToolCallAccumulator::new();
        acc.append(3, "{}");
        let call = &acc.close_all()[0];
        assert!(call.id.starts_with("call_3_"));
    }
}
