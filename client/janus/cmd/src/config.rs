//! Configuration handling for the probe binary.
//!
//! Reads an optional YAML config file, then applies environment variable
//! overrides, producing the engine's `ClientConfig`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use janus_session::ClientConfig;

/// Probe configuration. Durations are humantime strings (`"5s"`, `"250ms"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Gateway WebSocket endpoint.
    pub url: String,
    /// Maximum consecutive connection attempts; 0 = unlimited.
    pub connection_tries_limit: u32,
    /// Connect attempt deadline.
    pub connection_timeout: String,
    /// Reconnect automatically after a drop.
    pub reconnect: bool,
    /// Establish a gateway session as part of connecting.
    pub create_session_on_connect: bool,
    /// Keepalive probe interval.
    pub keep_alive_interval: String,
    /// Keepalive acknowledgment deadline.
    pub keep_alive_timeout: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8188/".to_owned(),
            connection_tries_limit: 0,
            connection_timeout: "5s".to_owned(),
            reconnect: false,
            create_session_on_connect: true,
            keep_alive_interval: "5s".to_owned(),
            keep_alive_timeout: "3s".to_owned(),
        }
    }
}

impl ProbeConfig {
    /// Load configuration from an optional file, then apply environment
    /// overrides.
    pub fn load<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_yaml::from_str::<ProbeConfig>(&content) {
                    Ok(parsed) => {
                        config = parsed;
                        info!("loaded configuration from {:?}", path.as_ref());
                    }
                    Err(error) => {
                        warn!(
                            "failed to parse config file {:?}, using defaults: {error}",
                            path.as_ref()
                        );
                    }
                },
                Err(error) => {
                    warn!(
                        "config file {:?} not readable, using defaults: {error}",
                        path.as_ref()
                    );
                }
            }
        }

        config.apply_environment_overrides();
        Ok(config)
    }

    /// Apply `JANUS_*` environment variable overrides.
    fn apply_environment_overrides(&mut self) {
        if let Ok(url) = std::env::var("JANUS_URL") {
            self.url = url;
            info!("gateway url overridden by environment: {}", self.url);
        }
        if let Ok(limit) = std::env::var("JANUS_TRIES_LIMIT") {
            if let Ok(limit) = limit.parse::<u32>() {
                self.connection_tries_limit = limit;
                info!("connection tries limit overridden by environment: {limit}");
            }
        }
        if let Ok(reconnect) = std::env::var("JANUS_RECONNECT") {
            self.reconnect = reconnect.to_lowercase() == "true";
            info!("reconnect overridden by environment: {}", self.reconnect);
        }
        if let Ok(interval) = std::env::var("JANUS_KEEPALIVE_INTERVAL") {
            self.keep_alive_interval = interval;
            info!(
                "keepalive interval overridden by environment: {}",
                self.keep_alive_interval
            );
        }
    }

    /// Resolve into the engine configuration.
    pub fn client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            url: self.url.clone(),
            connection_tries_limit: self.connection_tries_limit,
            connection_timeout: humantime::parse_duration(&self.connection_timeout)
                .context("invalid connection_timeout")?,
            reconnect: self.reconnect,
            create_session_on_connect: self.create_session_on_connect,
            keep_alive_interval: humantime::parse_duration(&self.keep_alive_interval)
                .context("invalid keep_alive_interval")?,
            keep_alive_timeout: humantime::parse_duration(&self.keep_alive_timeout)
                .context("invalid keep_alive_timeout")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_resolves() {
        let config = ProbeConfig::default();
        let client = config.client_config().unwrap();
        assert_eq!(client.url, "ws://127.0.0.1:8188/");
        assert_eq!(client.connection_timeout, Duration::from_secs(5));
        assert_eq!(client.keep_alive_timeout, Duration::from_secs(3));
        assert!(client.create_session_on_connect);
    }

    #[test]
    fn loads_from_file() {
        let yaml = r#"
url: wss://gateway.example.org/janus
connection_tries_limit: 3
connection_timeout: 2s
reconnect: true
keep_alive_interval: 250ms
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = ProbeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.url, "wss://gateway.example.org/janus");
        assert_eq!(config.connection_tries_limit, 3);
        assert!(config.reconnect);

        let client = config.client_config().unwrap();
        assert_eq!(client.connection_timeout, Duration::from_secs(2));
        assert_eq!(client.keep_alive_interval, Duration::from_millis(250));
        // Fields absent from the file keep their defaults.
        assert_eq!(client.keep_alive_timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_bad_durations() {
        let config = ProbeConfig {
            connection_timeout: "not-a-duration".to_owned(),
            ..ProbeConfig::default()
        };
        assert!(config.client_config().is_err());
    }
}
