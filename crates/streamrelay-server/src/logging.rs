//! Optional on-disk event log: one JSON line per observed upstream SSE
//! payload, independent of what the rewriter does with it. Best-effort —
//! a write failure is logged via `tracing::warn!` and never fails the
//! response it's shadowing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Serialize)]
struct LogLine<'a> {
    seq: u64,
    timestamp_ms: u128,
    payload: &'a str,
}

/// Cloneable handle shared across a request's lifetime; `None` when
/// `RELAY_EVENT_LOG_PATH` is unset.
#[derive(Clone, Default)]
pub struct EventLogger {
    inner: Option<Arc<Inner>>,
}

struct Inner {
    file: Mutex<tokio::fs::File>,
    sequence: AtomicU64,
}

impl EventLogger {
    pub async fn open(path: Option<&str>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match OpenOptions::new().create(true).append(true).open(path).await {
            Ok(file) => Self {
                inner: Some(Arc::new(Inner {
                    file: Mutex::new(file),
                    sequence: AtomicU64::new(0),
                })),
            },
            Err(err) => {
                tracing::warn!(%err, path, "failed to open event log; continuing without it");
                Self::default()
            }
        }
    }

    /// Records one raw upstream payload. No-op when logging is disabled.
    pub async fn log(&self, payload: &[u8]) {
        let Some(inner) = &self.inner else {
            return;
        };
        let text = String::from_utf8_lossy(payload);
        let seq = inner.sequence.fetch_add(1, Ordering::SeqCst);
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let line = LogLine {
            seq,
            timestamp_ms,
            payload: &text,
        };
        let mut serialized = match serde_json::to_vec(&line) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(%err, "failed to serialize event log line");
                return;
            }
        };
        serialized.push(b'\n');

        let mut file = inner.file.lock().await;
        if let Err(err) = file.write_all(&serialized).await {
            tracing::warn!(%err, "failed to write event log line");
        }
    }
}
