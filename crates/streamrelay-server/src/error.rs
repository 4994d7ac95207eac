//! Shell-level error types. `streamrelay-core` never returns a `Result` for
//! its steady-state path (decode failures degrade to passthrough instead of
//! erroring); everything here is specific to the HTTP shell around it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingRequired(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("upstream returned {status}: {message}")]
    Upstream { status: StatusCode, message: String },
    #[error("upstream request failed: {0}")]
    UpstreamUnreachable(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    message: String,
    #[serde(rename = "type")]
    kind: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            ApiError::Upstream { status, .. } => (*status, "upstream_error"),
            ApiError::UpstreamUnreachable(_) => (StatusCode::BAD_GATEWAY, "upstream_unreachable"),
            ApiError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        tracing::warn!(error = %self, %status, "request failed");
        let body = ErrorBody {
            error: ErrorDetail {
                message: self.to_string(),
                kind,
            },
        };
        (status, axum::Json(body)).into_response()
    }
}
