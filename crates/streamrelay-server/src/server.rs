//! Shared application state and router wiring.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::logging::EventLogger;
use crate::proxy::UpstreamClient;
use crate::routes;

pub struct AppState {
    pub config: Config,
    pub upstream: UpstreamClient,
    pub event_logger: EventLogger,
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/v1/models", get(routes::list_models))
        .route("/v1/chat/completions", post(routes::chat_completions))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.bind_addr.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "streamrelay listening");
    axum::serve(listener, app).await?;
    Ok(())
}
