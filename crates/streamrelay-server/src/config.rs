//! Environment-derived configuration. Loaded once at startup and held for
//! the process lifetime behind [`crate::server::AppState`].

use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub upstream_base_url: String,
    pub upstream_timeout: Duration,
    pub event_log_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = std::env::var("RELAY_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let upstream_base_url = std::env::var("RELAY_UPSTREAM_BASE_URL")
            .map_err(|_| ConfigError::MissingRequired("RELAY_UPSTREAM_BASE_URL"))?;

        let upstream_timeout_secs = match std::env::var("RELAY_UPSTREAM_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("RELAY_UPSTREAM_TIMEOUT_SECS", raw))?,
            Err(_) => DEFAULT_UPSTREAM_TIMEOUT_SECS,
        };

        let event_log_path = std::env::var("RELAY_EVENT_LOG_PATH").ok();

        Ok(Self {
            bind_addr,
            upstream_base_url,
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
            event_log_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases live in one test: Config::from_env reads process-global
    // env vars, and cargo runs unit tests in the same binary concurrently.
    #[test]
    fn from_env_validates_required_and_numeric_vars() {
        std::env::remove_var("RELAY_UPSTREAM_BASE_URL");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired("RELAY_UPSTREAM_BASE_URL")));

        std::env::set_var("RELAY_UPSTREAM_BASE_URL", "http://example.test");
        std::env::set_var("RELAY_UPSTREAM_TIMEOUT_SECS", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("RELAY_UPSTREAM_TIMEOUT_SECS", _)));

        std::env::set_var("RELAY_UPSTREAM_TIMEOUT_SECS", "30");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.upstream_timeout, std::time::Duration::from_secs(30));

        std::env::remove_var("RELAY_UPSTREAM_BASE_URL");
        std::env::remove_var("RELAY_UPSTREAM_TIMEOUT_SECS");
    }
}
