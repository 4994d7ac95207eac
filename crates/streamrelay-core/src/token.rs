//! The fixed delimiter alphabet of the upstream's tool-call sub-language.
//!
//! Every delimiter is a byte-exact, case-sensitive string beginning with `<`.
//! No delimiter contains `<` anywhere but its first byte, which is what lets
//! the rewriter use a single byte (`<`) as its "might be a delimiter" sentinel
//! instead of a full longest-prefix-match automaton.

/// Opens a run of zero or more tool calls.
pub const S_BEG: &str = "<|tool_calls_section_begin|>";
/// Opens a single tool call's header (identifier).
pub const C_BEG: &str = "<|tool_call_begin|>";
/// Separates a tool call's identifier from its argument body.
pub const A_BEG: &str = "<|tool_call_argument_begin|>";
/// Closes a single tool call.
pub const C_END: &str = "<|tool_call_end|>";
/// Closes the tool-call section.
pub const S_END: &str = "<|tool_calls_section_end|>";

/// True if `s` contains any byte that could begin a delimiter token, i.e. the
/// text might still turn into a delimiter if more bytes arrive. Every
/// delimiter in [`S_BEG`], [`C_BEG`], [`A_BEG`], [`C_END`], [`S_END`] starts
/// with `<`, so that single byte is the only thing worth holding back.
pub fn looks_like_token_start(s: &str) -> bool {
    s.contains('<')
}

/// True if `text` could contain the start of a tool-call section, used by the
/// fast passthrough path to decide whether reasoning text needs to enter the
/// state machine at all.
pub fn mentions_tool_call(text: &str) -> bool {
    text.contains("<|tool_call")
}

/// Result of parsing a raw tool-call identifier (the bytes between
/// [`C_BEG`] and [`A_BEG`]) into a downstream id and display name.
pub struct ParsedIdentifier {
    pub id: String,
    pub name: String,
}

/// Parses a raw tool-call identifier per the upstream's two id conventions.
///
/// - Whitespace is trimmed first.
/// - An identifier already prefixed with `call_` is used verbatim as the
///   downstream id (this preserves ids the upstream already generated in the
///   OpenAI convention).
/// - Otherwise a stable id is synthesized from `tool_index` and the given
///   monotonic millisecond timestamp; the raw identifier is kept only for
///   name extraction.
/// - The display name is the substring after the first `.` (if any), then the
///   substring before the last `:` (if any): `functions.bash:15` -> `bash`,
///   `my.pkg.task:3` -> `pkg.task`, `do_it` -> `do_it`.
pub fn parse_identifier(raw: &str, tool_index: u32, monotonic_millis: u64) -> ParsedIdentifier {
    let trimmed = raw.trim();

    let id = if trimmed.starts_with("call_") {
        trimmed.to_string()
    } else {
        format!("call_{tool_index}_{monotonic_millis}")
    };

    let after_dot = match trimmed.find('.') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    };
    let name = match after_dot.rfind(':') {
        Some(pos) => &after_dot[..pos],
        None => after_dot,
    };

    ParsedIdentifier {
        id,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_tool_call_detects_partial_delimiter() {
        assert!(mentions_tool_call("pre <|tool_call"));
        assert!(!mentions_tool_call("plain text"));
    }

    #[test]
    fn looks_like_token_start_is_angle_bracket_only() {
        assert!(looks_like_token_start("if x < 5"));
        assert!(!looks_like_token_start("no brackets here"));
    }

    #[test]
    fn parse_identifier_uses_explicit_call_prefix_verbatim() {
        let parsed = parse_identifier("call_abc123", 0, 999);
        assert_eq!(parsed.id, "call_abc123");
        assert_eq!(parsed.name, "call_abc123");
    }

    #[test]
    fn parse_identifier_synthesizes_id_and_extracts_name() {
        let parsed = parse_identifier("functions.bash:15", 2, 1_700_000_000_000);
        assert_eq!(parsed.id, "call_2_1700000000000");
        assert_eq!(parsed.name, "bash");
    }

    #[test]
    fn parse_identifier_handles_multiple_dots() {
        let parsed = parse_identifier("my.pkg.task:3", 0, 1);
        assert_eq!(parsed.name, "pkg.task");
    }

    #[test]
    fn parse_identifier_handles_no_dot_or_colon() {
        let parsed = parse_identifier("do_it", 0, 1);
        assert_eq!(parsed.name, "do_it");
    }

    #[test]
    fn parse_identifier_trims_whitespace() {
        let parsed = parse_identifier("  bash:1  ", 0, 1);
        assert_eq!(parsed.name, "bash");
    }
}
