//! Client configuration.

use std::time::Duration;

/// Configuration for a [`crate::JanusClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Gateway WebSocket endpoint, e.g. `wss://gateway.example.org/janus`.
    pub url: String,
    /// Maximum consecutive connection attempts before automatic
    /// reconnection gives up; 0 means unlimited.
    pub connection_tries_limit: u32,
    /// How long a connect attempt may take before it is aborted.
    pub connection_timeout: Duration,
    /// Whether to reconnect automatically after a drop.
    pub reconnect: bool,
    /// Whether to establish a gateway session as part of connecting.
    pub create_session_on_connect: bool,
    /// Interval between keepalive probes while a session is established.
    pub keep_alive_interval: Duration,
    /// Deadline for each keepalive probe's acknowledgment.
    pub keep_alive_timeout: Duration,
}

impl ClientConfig {
    /// Configuration for `url` with default timings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connection_tries_limit: 0,
            connection_timeout: Duration::from_secs(5),
            reconnect: false,
            create_session_on_connect: true,
            keep_alive_interval: Duration::from_secs(5),
            keep_alive_timeout: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timings() {
        let config = ClientConfig::new("ws://127.0.0.1:8188/");
        assert_eq!(config.url, "ws://127.0.0.1:8188/");
        assert_eq!(config.connection_tries_limit, 0);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
        assert!(!config.reconnect);
        assert!(config.create_session_on_connect);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(5));
        assert_eq!(config.keep_alive_timeout, Duration::from_secs(3));
    }
}
