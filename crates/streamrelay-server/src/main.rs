use std::sync::Arc;

use streamrelay_server::config::Config;
use streamrelay_server::logging::EventLogger;
use streamrelay_server::proxy::UpstreamClient;
use streamrelay_server::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let upstream = UpstreamClient::new(config.upstream_base_url.clone(), config.upstream_timeout)?;
    let event_logger = EventLogger::open(config.event_log_path.as_deref()).await;

    let state = Arc::new(AppState {
        config,
        upstream,
        event_logger,
    });

    server::run(state).await
}
