//! Incremental rewriter for the upstream's token-delimited tool-call
//! sub-language.
//!
//! The upstream streams tool calls as plain text inside its `reasoning`
//! delta field, wrapped in a small fixed set of `<|tool_call...|>`
//! delimiters. This crate turns that text stream, as it arrives in
//! arbitrarily-sized chunks, into OpenAI-compatible `tool_calls` deltas
//! without ever buffering a whole response or assuming a delimiter lands
//! inside a single chunk.
//!
//! [`adapter::StreamAdapter`] is the entry point most callers want: it wraps
//! a [`rewriter::Rewriter`] and speaks directly in framed SSE bytes.

pub mod adapter;
pub mod builder;
pub mod event;
pub mod rewriter;
pub mod token;

pub use adapter::StreamAdapter;
pub use rewriter::{Emission, Rewriter};
