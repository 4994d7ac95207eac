//! The upstream client: forwards requests to the configured upstream base
//! URL, propagating the caller's authorization and dropping hop-by-hop
//! headers that don't make sense to replay.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use futures::Stream;
use reqwest::Client;

use crate::error::ApiError;

const DROPPED_REQUEST_HEADERS: [&str; 3] = ["host", "content-length", "connection"];

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::UpstreamUnreachable)?;
        Ok(Self { http, base_url })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn forward_headers(headers: &HeaderMap) -> HeaderMap {
        let mut out = HeaderMap::new();
        for (name, value) in headers {
            if DROPPED_REQUEST_HEADERS.contains(&name.as_str()) {
                continue;
            }
            out.insert(name.clone(), value.clone());
        }
        out
    }

    /// Forwards a request and returns the fully-buffered response body.
    /// Used for non-streaming completions and passthrough endpoints
    /// (`/v1/models`).
    pub async fn forward(
        &self,
        method: reqwest::Method,
        path: &str,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> Result<(StatusCode, HeaderMap, Bytes), ApiError> {
        let mut req = self.http.request(method, self.url_for(path)).headers(Self::forward_headers(headers));
        if let Some(body) = body {
            req = req.body(body);
        }
        let resp = req.send().await?;
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let headers = convert_headers(resp.headers());
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(ApiError::Upstream {
                status,
                message: String::from_utf8_lossy(&bytes).to_string(),
            });
        }
        Ok((status, headers, bytes))
    }

    /// Forwards a request and returns the upstream's byte stream unbuffered,
    /// for `stream: true` chat completions.
    pub async fn forward_stream(
        &self,
        method: reqwest::Method,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>>, ApiError> {
        let req = self
            .http
            .request(method, self.url_for(path))
            .headers(Self::forward_headers(headers))
            .body(body);
        let resp = req.send().await?;
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        if !status.is_success() {
            let bytes = resp.bytes().await?;
            return Err(ApiError::Upstream {
                status,
                message: String::from_utf8_lossy(&bytes).to_string(),
            });
        }
        Ok(resp.bytes_stream())
    }
}

fn convert_headers(src: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in src {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.insert(name, value);
        }
    }
    out
}
