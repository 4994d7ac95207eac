//! Wraps a [`Rewriter`] with SSE framing: turns deframed upstream `data`
//! payloads into already-framed downstream SSE events. Stays ignorant of the
//! actual SSE deframing/transport, which the server crate owns.

use crate::rewriter::Rewriter;

const DONE_MARKER: &[u8] = b"[DONE]";

/// One per upstream response. Owns a [`Rewriter`] and produces complete
/// `data: ...\n\n` events ready to write to the downstream connection.
pub struct StreamAdapter {
    rewriter: Rewriter,
}

impl Default for StreamAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAdapter {
    pub fn new() -> Self {
        Self {
            rewriter: Rewriter::new(),
        }
    }

    /// Handles one deframed upstream SSE event (the bytes after the `data: `
    /// prefix, before any trailing newlines were stripped). Blank
    /// keep-alive lines yield no output; `[DONE]` is forwarded unchanged
    /// without being offered to the rewriter.
    pub fn handle_event(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let trimmed = trim_ascii_whitespace(data);
        if trimmed.is_empty() {
            return Vec::new();
        }
        if trimmed == DONE_MARKER {
            return vec![frame(DONE_MARKER)];
        }
        self.rewriter
            .feed(data)
            .into_iter()
            .map(|emission| frame(&emission.into_bytes()))
            .collect()
    }

    /// Called once the upstream connection closes, before the downstream
    /// `[DONE]` (if any) is written: drains whatever the rewriter is still
    /// holding so no bytes are silently dropped.
    pub fn flush(&mut self) -> Vec<Vec<u8>> {
        self.rewriter
            .flush()
            .into_iter()
            .map(|emission| frame(&emission.into_bytes()))
            .collect()
    }
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(b"data: ");
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\n\n");
    out
}

fn trim_ascii_whitespace(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(data.len());
    let end = data.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(0, |p| p + 1);
    &data[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reasoning_chunk(text: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "1", "choices": [{"index": 0, "delta": {"reasoning": text}}],
        }))
        .unwrap()
    }

    #[test]
    fn blank_keepalive_yields_nothing() {
        let mut adapter = StreamAdapter::new();
        assert!(adapter.handle_event(b"   ").is_empty());
    }

    #[test]
    fn done_marker_is_forwarded_framed_and_untouched() {
        let mut adapter = StreamAdapter::new();
        let out = adapter.handle_event(b"[DONE]");
        assert_eq!(out, vec![b"data: [DONE]\n\n".to_vec()]);
    }

    #[test]
    fn plain_event_round_trips_through_framing() {
        let mut adapter = StreamAdapter::new();
        let out = adapter.handle_event(&reasoning_chunk("hello"));
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with(b"data: "));
        assert!(out[0].ends_with(b"\n\n"));
        assert!(String::from_utf8_lossy(&out[0]).contains("hello"));
    }

    #[test]
    fn flush_with_nothing_buffered_yields_nothing() {
        let mut adapter = StreamAdapter::new();
        assert!(adapter.flush().is_empty());
    }
}
