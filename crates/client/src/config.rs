//! Client configuration.

use std::time::Duration;

use anyhow::Context;
use counselflow_shared::TransportError;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ws::ReconnectConfig;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/api/v1/ws/ws";
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Socket endpoint; the auth token is appended as the last path segment.
    pub ws_url: String,
    pub reconnect: ReconnectConfig,
    pub heartbeat_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

impl ClientConfig {
    /// Read overrides from `COUNSELFLOW_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("COUNSELFLOW_WS_URL") {
            config.ws_url = url;
        }
        if let Some(value) = lookup("COUNSELFLOW_RECONNECT_INTERVAL_MS") {
            config.reconnect.interval_ms = value
                .parse()
                .context("COUNSELFLOW_RECONNECT_INTERVAL_MS must be an integer")?;
        }
        if let Some(value) = lookup("COUNSELFLOW_MAX_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = value
                .parse()
                .context("COUNSELFLOW_MAX_RECONNECT_ATTEMPTS must be an integer")?;
        }
        if let Some(value) = lookup("COUNSELFLOW_HEARTBEAT_INTERVAL_MS") {
            config.heartbeat_interval_ms = value
                .parse()
                .context("COUNSELFLOW_HEARTBEAT_INTERVAL_MS must be an integer")?;
        }

        Ok(config)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Build the socket URL for `token`.
    pub fn endpoint(&self, token: &str) -> Result<Url, TransportError> {
        let mut url =
            Url::parse(&self.ws_url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.ws_url.clone()))?
            .pop_if_empty()
            .push(token);
        Ok(url)
    }
}
