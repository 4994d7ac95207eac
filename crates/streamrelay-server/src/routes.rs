//! HTTP routes: health check, verbatim model listing, and the mediated
//! chat completions endpoint.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use streamrelay_core::StreamAdapter;

use crate::error::ApiError;
use crate::logging::EventLogger;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, ApiError> {
    let (status, resp_headers, body) = state
        .upstream
        .forward(reqwest::Method::GET, "/v1/models", &headers, None)
        .await?;
    Ok((status, resp_headers, body).into_response())
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let wants_stream = request_wants_stream(&body)?;

    if !wants_stream {
        let (status, resp_headers, resp_body) = state
            .upstream
            .forward(reqwest::Method::POST, "/v1/chat/completions", &headers, Some(body))
            .await?;
        return Ok((status, resp_headers, resp_body).into_response());
    }

    let upstream_bytes = state
        .upstream
        .forward_stream(reqwest::Method::POST, "/v1/chat/completions", &headers, body)
        .await?;

    let relay_state = RelayState {
        source: Box::pin(upstream_bytes.eventsource()),
        adapter: StreamAdapter::new(),
        event_logger: state.event_logger.clone(),
        pending: VecDeque::new(),
        finished: false,
    };

    let sse_stream = stream::unfold(relay_state, drive_relay).flat_map(|framed| {
        stream::iter(framed.into_iter().map(bytes_to_event).map(Ok::<_, Infallible>))
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()).into_response())
}

type UpstreamEventStream =
    Pin<Box<dyn Stream<Item = Result<eventsource_stream::Event, EventStreamError<reqwest::Error>>> + Send>>;

/// Carries the adapter and its upstream source across polls so a single
/// `Stream` can both rewrite events as they arrive and, once the upstream
/// closes, flush whatever the rewriter is still holding.
struct RelayState {
    source: UpstreamEventStream,
    adapter: StreamAdapter,
    event_logger: EventLogger,
    pending: VecDeque<Vec<u8>>,
    finished: bool,
}

/// `stream::unfold` step function: drains `pending` before touching the
/// upstream again, and runs the adapter's terminal flush exactly once when
/// the upstream source is exhausted.
async fn drive_relay(mut state: RelayState) -> Option<(Vec<Vec<u8>>, RelayState)> {
    loop {
        if let Some(framed) = state.pending.pop_front() {
            return Some((vec![framed], state));
        }
        if state.finished {
            return None;
        }
        match state.source.next().await {
            Some(Ok(msg)) => {
                let data = msg.data.into_bytes();
                let logger = state.event_logger.clone();
                let log_data = data.clone();
                tokio::spawn(async move { logger.log(&log_data).await });
                state.pending.extend(state.adapter.handle_event(&data));
            }
            Some(Err(err)) => {
                tracing::warn!(%err, "malformed upstream SSE frame; skipping");
            }
            None => {
                state.pending.extend(state.adapter.flush());
                state.finished = true;
            }
        }
    }
}

fn bytes_to_event(framed: Vec<u8>) -> Event {
    // `framed` is already `data: <payload>\n\n`; strip the framing since
    // axum's `Event` re-adds it.
    let text = String::from_utf8_lossy(&framed);
    let payload = text
        .strip_prefix("data: ")
        .unwrap_or(&text)
        .trim_end_matches("\n\n")
        .to_string();
    Event::default().data(payload)
}

fn request_wants_stream(body: &[u8]) -> Result<bool, ApiError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|err| ApiError::BadRequest(format!("invalid JSON body: {err}")))?;
    Ok(value.get("stream").and_then(|v| v.as_bool()).unwrap_or(false))
}
