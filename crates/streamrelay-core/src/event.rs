//! The upstream/downstream chunk shapes and the three pure operations the
//! rewriter is built from: `decode`, `shallow_rebase`, `encode`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded SSE `data` payload from the upstream.
///
/// `id`, `object`, `model`, `created` and `usage` are kept as raw
/// [`serde_json::Value`] rather than typed fields so they echo onto emitted
/// chunks byte-for-byte regardless of how the upstream shapes them.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamChunk {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub object: Option<Value>,
    #[serde(default)]
    pub model: Option<Value>,
    #[serde(default)]
    pub created: Option<Value>,
    #[serde(default)]
    pub choices: Vec<UpstreamChoice>,
    #[serde(default)]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: UpstreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpstreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Value>,
    /// Upstream-observed misplacement: some upstreams put the finish reason
    /// inside `delta` instead of on the choice. Promoted onto the choice
    /// before any further processing (see [`crate::rewriter::Rewriter::feed`]).
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl UpstreamDelta {
    /// The reasoning text to feed the state machine: `reasoning` and
    /// `reasoning_content` are equivalent when both are present, so only the
    /// first non-empty one is used.
    pub fn reasoning_text(&self) -> &str {
        match &self.reasoning {
            Some(text) if !text.is_empty() => text,
            _ => self.reasoning_content.as_deref().unwrap_or(""),
        }
    }
}

/// The echoed identification fields plus the originating choice's index and
/// (already-promoted) finish reason, ready to be paired with a fresh delta.
#[derive(Debug, Clone)]
pub struct ChunkBase {
    pub id: Option<Value>,
    pub object: Option<Value>,
    pub model: Option<Value>,
    pub created: Option<Value>,
    pub usage: Option<Value>,
    pub choice_index: u32,
    pub finish_reason: Option<String>,
}

/// `decode(bytes) -> Chunk | Err`: a parse failure yields the raw bytes as an
/// opaque passthrough payload rather than propagating an error.
pub enum Decoded {
    Chunk(UpstreamChunk),
    Passthrough(Vec<u8>),
}

pub fn decode(raw: &[u8]) -> Decoded {
    match serde_json::from_slice::<UpstreamChunk>(raw) {
        Ok(chunk) => Decoded::Chunk(chunk),
        Err(_) => Decoded::Passthrough(raw.to_vec()),
    }
}

/// `shallow_rebase(chunk) -> ChunkBase`: carries the same id/object/model/
/// created/usage and the originating choice's index and finish_reason,
/// leaving the delta to be filled in by the chunk builder.
pub fn shallow_rebase(chunk: &UpstreamChunk) -> ChunkBase {
    let choice = chunk.choices.first();
    ChunkBase {
        id: chunk.id.clone(),
        object: chunk.object.clone(),
        model: chunk.model.clone(),
        created: chunk.created.clone(),
        usage: chunk.usage.clone(),
        choice_index: choice.map(|c| c.index).unwrap_or(0),
        finish_reason: choice.and_then(|c| c.finish_reason.clone()),
    }
}

/// A downstream chunk with a single choice and exactly one delta variant.
#[derive(Debug, Clone, Serialize)]
pub struct DownstreamChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<Value>,
    pub choices: [DownstreamChoice; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownstreamChoice {
    pub index: u32,
    pub delta: DownstreamDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DownstreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<[ToolCallDelta; 1]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    pub index: u32,
    pub function: FunctionDelta,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub arguments: String,
}

impl DownstreamChunk {
    pub fn from_base(base: &ChunkBase, delta: DownstreamDelta) -> Self {
        Self {
            id: base.id.clone(),
            object: base.object.clone(),
            model: base.model.clone(),
            created: base.created.clone(),
            usage: None,
            choices: [DownstreamChoice {
                index: base.choice_index,
                delta,
                finish_reason: base.finish_reason.clone(),
            }],
        }
    }
}

/// `encode(Chunk) -> bytes`: deterministic JSON emission. Empty optional
/// fields are suppressed via `skip_serializing_if` on the struct definitions
/// above, so downstream clients see clean deltas.
pub fn encode(chunk: &DownstreamChunk) -> Vec<u8> {
    serde_json::to_vec(chunk).expect("DownstreamChunk serialization is infallible")
}
