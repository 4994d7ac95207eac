//! Pure, stateless construction of the five downstream emission kinds.
//!
//! Each function takes the rebased metadata for the chunk it derives from
//! and returns a ready-to-encode [`DownstreamChunk`], or `None` when the
//! emission would be empty and should be suppressed.

use crate::event::{ChunkBase, DownstreamChunk, DownstreamDelta, FunctionDelta, ToolCallDelta};

/// Free text, e.g. reasoning content outside any tool-call section.
pub fn content(base: &ChunkBase, text: &str) -> Option<DownstreamChunk> {
    if text.is_empty() {
        return None;
    }
    Some(DownstreamChunk::from_base(
        base,
        DownstreamDelta {
            content: Some(text.to_string()),
            tool_calls: None,
        },
    ))
}

/// Announces a tool call: carries the id, name and `type:"function"`, with
/// an explicit empty `arguments` string. Never suppressed, even when `name`
/// is empty, since this is what establishes the call's id downstream.
pub fn tool_call_header(base: &ChunkBase, index: u32, id: String, name: String) -> DownstreamChunk {
    DownstreamChunk::from_base(
        base,
        DownstreamDelta {
            content: None,
            tool_calls: Some([ToolCallDelta {
                id: Some(id),
                kind: Some("function"),
                index,
                function: FunctionDelta {
                    name: Some(name),
                    arguments: String::new(),
                },
            }]),
        },
    )
}

/// Streams a slice of a tool call's argument bytes. No id, type or name.
pub fn tool_call_argument(base: &ChunkBase, index: u32, args: &str) -> Option<DownstreamChunk> {
    if args.is_empty() {
        return None;
    }
    Some(DownstreamChunk::from_base(
        base,
        DownstreamDelta {
            content: None,
            tool_calls: Some([ToolCallDelta {
                id: None,
                kind: None,
                index,
                function: FunctionDelta {
                    name: None,
                    arguments: args.to_string(),
                },
            }]),
        },
    ))
}

/// Terminal chunk: empty delta, `finish_reason` carried on `base`.
pub fn finish(base: &ChunkBase) -> DownstreamChunk {
    DownstreamChunk::from_base(base, DownstreamDelta::default())
}
