//! Server-sent event plumbing shared by the streaming providers.
//!
//! Bytes from the HTTP body are split into lines by [`LineBuffer`]; each
//! provider supplies an [`SseDecoder`] that turns lines into
//! [`StreamChunk`]s. [`pump`] drives the two from a spawned task.

use futures::StreamExt;
use hintloop_core::error::ProviderError;
use hintloop_core::provider::StreamChunk;
use tokio::sync::mpsc;

/// Splits a byte stream into lines without breaking multi-byte characters
/// across network chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bytes and return every complete line (without `\r\n`).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left once the body ends.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// The payload of a `data:` line, if this is one.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Turns SSE lines into stream chunks for one provider wire format.
pub trait SseDecoder: Send + 'static {
    /// Handle one complete line. A returned chunk with `done` set ends the
    /// stream; an error aborts it.
    fn on_line(&mut self, line: &str) -> Result<Vec<StreamChunk>, ProviderError>;

    /// Build the terminal chunk when the body ends without an explicit stop.
    fn finish(&mut self) -> StreamChunk;
}

/// Read `response` to the end, forwarding decoded chunks into `tx`.
pub async fn pump<D: SseDecoder>(
    response: reqwest::Response,
    mut decoder: D,
    tx: mpsc::Sender<Result<StreamChunk, ProviderError>>,
) {
    let mut bytes = response.bytes_stream();
    let mut lines = LineBuffer::new();

    while let Some(next) = bytes.next().await {
        let chunk = match next {
            Ok(b) => b,
            Err(e) => {
                let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                return;
            }
        };

        for line in lines.push(&chunk) {
            if forward(&mut decoder, &line, &tx).await {
                return;
            }
        }
    }

    if let Some(line) = lines.flush() {
        if forward(&mut decoder, &line, &tx).await {
            return;
        }
    }

    let _ = tx.send(Ok(decoder.finish())).await;
}

/// Decode one line and send the results. Returns true once the stream is
/// over (done, error, or receiver dropped).
async fn forward<D: SseDecoder>(
    decoder: &mut D,
    line: &str,
    tx: &mpsc::Sender<Result<StreamChunk, ProviderError>>,
) -> bool {
    match decoder.on_line(line) {
        Ok(chunks) => {
            for out in chunks {
                let done = out.done;
                if tx.send(Ok(out)).await.is_err() || done {
                    return true;
                }
            }
            false
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_split_across_pushes() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        let lines = buf.push(b":1}\r\n\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: [DONE]"]);
        assert!(buf.flush().is_none());
    }

    #[test]
    fn multibyte_char_split_between_chunks() {
        let text = "data: héllo\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut buf = LineBuffer::new();
        assert!(buf.push(&text[..split]).is_empty());
        assert_eq!(buf.push(&text[split..]), vec!["data: héllo"]);
    }

    #[test]
    fn flush_returns_trailing_partial_line() {
        let mut buf = LineBuffer::new();
        buf.push(b"data: tail");
        assert_eq!(buf.flush().as_deref(), Some("data: tail"));
    }

    #[test]
    fn data_prefix_with_or_without_space() {
        assert_eq!(data_payload("data: {}"), Some("{}"));
        assert_eq!(data_payload("data:{}"), Some("{}"));
        assert_eq!(data_payload("event: ping"), None);
    }
}
