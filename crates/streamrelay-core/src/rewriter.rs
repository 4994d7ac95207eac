//! The incremental rewriter: the state machine that turns the upstream's
//! token-delimited tool-call sub-language, embedded inside streamed
//! reasoning text, into OpenAI-compatible tool-call deltas.
//!
//! [`Rewriter`] is pure and synchronous: it owns no I/O and borrows no
//! runtime. `feed` consumes one decoded (or undecodable) upstream SSE
//! payload and returns zero or more [`Emission`]s; `flush` drains whatever
//! is left buffered when the upstream stream closes.

use crate::builder;
use crate::event::{self, ChunkBase, Decoded, DownstreamChunk, UpstreamChunk};
use crate::token::{self, A_BEG, C_BEG, C_END, S_BEG, S_END};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Buffer ceiling past which the rewriter gives up waiting for a delimiter to
/// complete and dumps whatever it is holding as plain content. Guards against
/// an upstream that opens a section and never closes it.
const DEFAULT_SOFT_CAP: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    InSection,
    ReadingId,
    ReadingArgs,
    Trailing,
}

/// One fully-formed output of a `feed`/`flush` call: either bytes to forward
/// completely unchanged, or a chunk the rewriter built and that still needs
/// encoding.
pub enum Emission {
    /// A decode failure, a usage-only frame, or an already-structured
    /// `tool_calls` delta: bytes the rewriter never touched.
    Verbatim(Vec<u8>),
    /// A chunk assembled from rebased metadata and a delta the state machine
    /// produced.
    Built(DownstreamChunk),
}

impl Emission {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Emission::Verbatim(bytes) => bytes,
            Emission::Built(chunk) => event::encode(&chunk),
        }
    }
}

/// Per-request state. One instance per upstream response.
pub struct Rewriter {
    state: State,
    buf: String,
    tool_index: u32,
    current_id: String,
    soft_cap: usize,
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Rewriter {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            buf: String::new(),
            tool_index: 0,
            current_id: String::new(),
            soft_cap: DEFAULT_SOFT_CAP,
        }
    }

    pub fn with_soft_cap(soft_cap: usize) -> Self {
        Self {
            soft_cap,
            ..Self::new()
        }
    }

    #[cfg(test)]
    fn tool_index(&self) -> u32 {
        self.tool_index
    }

    #[cfg(test)]
    fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Feeds one upstream SSE `data` payload (already deframed, `[DONE]`
    /// already filtered out by the caller) through the rewriter.
    pub fn feed(&mut self, raw: &[u8]) -> Vec<Emission> {
        let chunk = match event::decode(raw) {
            Decoded::Passthrough(bytes) => return vec![Emission::Verbatim(bytes)],
            Decoded::Chunk(chunk) => chunk,
        };
        self.feed_chunk(raw, chunk)
    }

    /// Drains any residual buffered text once the upstream stream has
    /// closed. There is no source chunk to rebase onto, so id/object/model/
    /// created are left absent on whatever is emitted.
    pub fn flush(&mut self) -> Vec<Emission> {
        let base = ChunkBase {
            id: None,
            object: None,
            model: None,
            created: None,
            usage: None,
            choice_index: 0,
            finish_reason: None,
        };
        let mut out = Vec::new();
        self.drain_remainder(&base, &mut out);
        out
    }

    fn feed_chunk(&mut self, raw: &[u8], mut chunk: UpstreamChunk) -> Vec<Emission> {
        if let Some(choice) = chunk.choices.get_mut(0) {
            if let Some(reason) = choice.delta.finish_reason.take() {
                choice.finish_reason = Some(reason);
            }
        }

        if chunk.choices.is_empty() {
            return vec![Emission::Verbatim(raw.to_vec())];
        }

        // An upstream that already speaks the OpenAI tool_calls wire shape
        // for this frame has nothing left for us to rewrite.
        if chunk.choices[0].delta.tool_calls.is_some() {
            return vec![Emission::Verbatim(raw.to_vec())];
        }

        let text = chunk.choices[0].delta.reasoning_text().to_string();

        // Nothing in this frame could start a delimiter, and there's no
        // delimiter prefix already held from an earlier frame waiting to be
        // completed (`self.buf` empty), so the text can go straight out as
        // content instead of entering the state machine.
        if self.state == State::Idle && self.buf.is_empty() && !token::mentions_tool_call(&text) {
            let base = event::shallow_rebase(&chunk);
            let mut out = Vec::new();
            if let Some(visible) = chunk.choices[0].delta.content.as_deref() {
                if let Some(built) = builder::content(&base, visible) {
                    out.push(Emission::Built(built));
                }
            }
            if let Some(built) = builder::content(&base, &text) {
                out.push(Emission::Built(built));
            }
            if chunk.choices[0].finish_reason.is_some() {
                out.push(Emission::Built(builder::finish(&base)));
            }
            return out;
        }

        let base = event::shallow_rebase(&chunk);
        let mut out = Vec::new();

        // `content` rides alongside reasoning rather than through it; forward
        // it untouched since it never participates in the sub-language.
        if let Some(visible) = chunk.choices[0].delta.content.as_deref() {
            if let Some(built) = builder::content(&base, visible) {
                out.push(Emission::Built(built));
            }
        }

        self.buf.push_str(&text);
        self.run_loop(&base, &mut out);
        self.enforce_soft_cap(&base, &mut out);

        if chunk.choices[0].finish_reason.is_some() {
            self.drain_remainder(&base, &mut out);
            out.push(Emission::Built(builder::finish(&base)));
        }

        out
    }

    fn run_loop(&mut self, base: &ChunkBase, out: &mut Vec<Emission>) {
        loop {
            match self.state {
                State::Idle => {
                    let Some(i) = self.buf.find(S_BEG) else {
                        return;
                    };
                    let pre = self.buf[..i].to_string();
                    if let Some(built) = builder::content(base, &pre) {
                        out.push(Emission::Built(built));
                    }
                    self.buf.drain(..i + S_BEG.len());
                    self.state = State::InSection;
                }
                State::InSection => {
                    let stripped = self.buf.trim_start_matches(|c: char| c.is_ascii_whitespace());
                    let skip = self.buf.len() - stripped.len();
                    if skip > 0 {
                        self.buf.drain(..skip);
                    }

                    let begin = self.buf.find(C_BEG);
                    let end = self.buf.find(S_END);
                    match (begin, end) {
                        (Some(b), Some(e)) if b < e => {
                            self.buf.drain(..b + C_BEG.len());
                            self.current_id.clear();
                            self.state = State::ReadingId;
                        }
                        (_, Some(e)) => {
                            self.buf.drain(..e + S_END.len());
                            let rest = std::mem::take(&mut self.buf);
                            if let Some(built) = builder::content(base, &rest) {
                                out.push(Emission::Built(built));
                            }
                            self.state = State::Trailing;
                            return;
                        }
                        (Some(b), None) => {
                            self.buf.drain(..b + C_BEG.len());
                            self.current_id.clear();
                            self.state = State::ReadingId;
                        }
                        (None, None) => return,
                    }
                }
                State::ReadingId => {
                    if let Some(k) = self.buf.find(A_BEG) {
                        self.current_id.push_str(&self.buf[..k]);
                        self.buf.drain(..k + A_BEG.len());
                        let id_text = std::mem::take(&mut self.current_id);
                        let parsed = token::parse_identifier(&id_text, self.tool_index, next_monotonic_millis());
                        out.push(Emission::Built(builder::tool_call_header(
                            base,
                            self.tool_index,
                            parsed.id,
                            parsed.name,
                        )));
                        self.state = State::ReadingArgs;
                    } else {
                        let (safe, retain) = split_at_last_angle(&self.buf);
                        self.current_id.push_str(&safe);
                        self.buf = retain;
                        return;
                    }
                }
                State::ReadingArgs => {
                    if let Some(k) = self.buf.find(C_END) {
                        let args = self.buf[..k].to_string();
                        if let Some(built) = builder::tool_call_argument(base, self.tool_index, &args) {
                            out.push(Emission::Built(built));
                        }
                        self.buf.drain(..k + C_END.len());
                        self.tool_index += 1;
                        self.state = State::InSection;
                    } else {
                        let (safe, retain) = split_at_last_angle(&self.buf);
                        if let Some(built) = builder::tool_call_argument(base, self.tool_index, &safe) {
                            out.push(Emission::Built(built));
                        }
                        self.buf = retain;
                        return;
                    }
                }
                State::Trailing => {
                    if !self.buf.is_empty() {
                        let rest = std::mem::take(&mut self.buf);
                        if let Some(built) = builder::content(base, &rest) {
                            out.push(Emission::Built(built));
                        }
                    }
                    return;
                }
            }
        }
    }

    /// Forces out whatever is left in `buf`, used both when a chunk carries
    /// a non-empty `finish_reason` and at stream close. Never synthesizes
    /// closing delimiters for a section left open mid-stream.
    fn drain_remainder(&mut self, base: &ChunkBase, out: &mut Vec<Emission>) {
        match self.state {
            State::Idle | State::Trailing => {
                if !self.buf.is_empty() {
                    let rest = std::mem::take(&mut self.buf);
                    if let Some(built) = builder::content(base, &rest) {
                        out.push(Emission::Built(built));
                    }
                }
            }
            State::ReadingArgs => {
                if !self.buf.is_empty() {
                    let rest = std::mem::take(&mut self.buf);
                    if let Some(built) = builder::tool_call_argument(base, self.tool_index, &rest) {
                        out.push(Emission::Built(built));
                    }
                }
            }
            State::InSection | State::ReadingId => {
                self.buf.clear();
            }
        }
    }

    fn enforce_soft_cap(&mut self, base: &ChunkBase, out: &mut Vec<Emission>) {
        if self.buf.len() <= self.soft_cap {
            return;
        }
        tracing::warn!(
            buffered = self.buf.len(),
            cap = self.soft_cap,
            "reasoning buffer exceeded soft cap; flushing as content and resetting"
        );
        let dumped = std::mem::take(&mut self.buf);
        if let Some(built) = builder::content(base, &dumped) {
            out.push(Emission::Built(built));
        }
        self.current_id.clear();
        self.state = State::Idle;
    }
}

/// Splits `buf` at its last `<`, the only byte that can start a delimiter.
/// Everything strictly before it is safe to emit now: since no delimiter in
/// the alphabet contains a second `<`, any earlier `<` is already disproven
/// by the later one's mere presence. Everything from the last `<` onward is
/// retained for the next feed.
fn split_at_last_angle(buf: &str) -> (String, String) {
    match buf.rfind('<') {
        Some(pos) => (buf[..pos].to_string(), buf[pos..].to_string()),
        None => (buf.to_string(), String::new()),
    }
}

static LAST_MILLIS: AtomicU64 = AtomicU64::new(0);

/// A strictly increasing millisecond counter, used to synthesize tool-call
/// ids that sort in arrival order even when several land in the same
/// wall-clock millisecond.
fn next_monotonic_millis() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    loop {
        let last = LAST_MILLIS.load(Ordering::SeqCst);
        let next = if now > last { now } else { last + 1 };
        if LAST_MILLIS
            .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk_bytes(reasoning: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "m",
            "choices": [{"index": 0, "delta": {"reasoning": reasoning}, "finish_reason": null}],
        }))
        .unwrap()
    }

    fn finish_bytes() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
        }))
        .unwrap()
    }

    fn decoded_text(emissions: &[Emission]) -> Vec<String> {
        emissions
            .iter()
            .map(|e| match e {
                Emission::Verbatim(bytes) => String::from_utf8(bytes.clone()).unwrap(),
                Emission::Built(chunk) => String::from_utf8(event::encode(chunk)).unwrap(),
            })
            .collect()
    }

    #[test]
    fn plain_reasoning_takes_the_fast_path() {
        let mut rw = Rewriter::new();
        let raw = chunk_bytes("just thinking");
        let out = rw.feed(&raw);
        assert_eq!(out.len(), 1);
        let Emission::Built(chunk) = &out[0] else {
            panic!("expected a built content chunk, got verbatim bytes");
        };
        assert_eq!(
            chunk.choices[0].delta.content.as_deref(),
            Some("just thinking")
        );
        assert!(rw.is_idle());
    }

    #[test]
    fn literal_angle_bracket_is_emitted_as_content_not_held_forever() {
        let mut rw = Rewriter::new();
        let out1 = rw.feed(&chunk_bytes("if x <"));
        let out2 = rw.feed(&chunk_bytes(" 5 then"));
        let text1 = decoded_text(&out1);
        let text2 = decoded_text(&out2);
        assert!(text1[0].contains("if x <"));
        assert!(text2[0].contains(" 5 then"));
    }

    #[test]
    fn full_tool_call_section_split_across_chunks_emits_header_and_arguments() {
        let mut rw = Rewriter::new();
        let mut all = Vec::new();

        all.extend(rw.feed(&chunk_bytes("Pre ")));
        all.extend(rw.feed(&chunk_bytes("<|tool_calls_")));
        all.extend(rw.feed(&chunk_bytes("section_begin|><|tool_call_begin|>func")));
        all.extend(rw.feed(&chunk_bytes("tions.bash:0<|tool_call_argument_begin|>")));
        all.extend(rw.feed(&chunk_bytes("{\"cmd\":")));
        all.extend(rw.feed(&chunk_bytes("\"ls\"}<|tool_call_end|><|tool_calls_section_end|>")));

        let texts = decoded_text(&all);
        let joined = texts.join("");
        assert!(joined.contains("Pre "));
        assert!(joined.contains("\"type\":\"function\""));
        assert!(joined.contains("\"name\":\"bash\""));
        assert!(joined.contains("\"arguments\":\"{\\\"cmd\\\":\""));
        assert!(joined.contains("\"arguments\":\"\\\"ls\\\"}\""));
        assert!(!joined.contains("tool_call_begin"));
        assert!(!joined.contains("tool_call_argument_begin"));
        assert_eq!(rw.tool_index(), 1);
    }

    #[test]
    fn mid_section_finish_drains_buffer_without_synthesizing_closers() {
        let mut rw = Rewriter::new();
        // The trailing `<` is an unresolved delimiter prefix: it stays
        // buffered (not yet emitted as an argument byte) until finish forces
        // it out, since more bytes could still have turned it into a real
        // `<|tool_call_end|>`.
        rw.feed(&chunk_bytes(
            "<|tool_calls_section_begin|><|tool_call_begin|>bash:0<|tool_call_argument_begin|>{\"a<",
        ));
        let out = rw.feed(&finish_bytes());
        let texts = decoded_text(&out);
        let joined = texts.join("");
        assert!(joined.contains("\"arguments\":\"<\""));
        assert!(joined.contains("\"finish_reason\":\"stop\""));
        assert!(!joined.contains("tool_call_end"));
    }

    #[test]
    fn decode_failure_is_verbatim_and_does_not_touch_state() {
        let mut rw = Rewriter::new();
        let out = rw.feed(b"not json");
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Emission::Verbatim(_)));
        assert!(rw.is_idle());
    }

    #[test]
    fn soft_cap_forces_a_flush_and_reset() {
        let mut rw = Rewriter::with_soft_cap(8);
        let out = rw.feed(&chunk_bytes("<|tool_calls_section_begin|>this section never closes"));
        assert!(decoded_text(&out).iter().any(|t| t.contains("content")));
        assert!(rw.is_idle());
    }
}
