//! Configuration for the streaming client.

use std::time::Duration;

use serde::Deserialize;

use crate::Result;

/// Default server endpoint.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/api/ws/audio";

/// Sample rate assumed until a track declares its own.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Client configuration.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// endpoint = "ws://mixer.local:8000/api/ws/audio"
/// reconnect_delay_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint URL.
    pub endpoint: String,
    /// How long `connect()` waits for the transport to open.
    pub connect_timeout_ms: u64,
    /// Reconnect attempts after an unexpected close before giving up.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Transition monitor cadence.
    pub transition_poll_ms: u64,
    /// Completion monitor cadence.
    pub completion_poll_ms: u64,
    /// Slack allowed when comparing the audio clock to a scheduled start.
    pub schedule_tolerance_ms: u64,
    /// Sample rate for audio that arrives before any track declares one.
    pub default_sample_rate: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_ms: 5_000,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 2_000,
            transition_poll_ms: 50,
            completion_poll_ms: 100,
            schedule_tolerance_ms: 20,
            default_sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given endpoint with default timings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn transition_poll(&self) -> Duration {
        Duration::from_millis(self.transition_poll_ms.max(1))
    }

    pub fn completion_poll(&self) -> Duration {
        Duration::from_millis(self.completion_poll_ms.max(1))
    }

    /// Tolerance in audio-clock seconds.
    pub fn schedule_tolerance(&self) -> f64 {
        self.schedule_tolerance_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timings() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert!((config.schedule_tolerance() - 0.020).abs() < 1e-9);
        assert_eq!(config.default_sample_rate, 44_100);
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let config = ClientConfig::from_toml_str(
            r#"
            endpoint = "ws://mixer.local:9000/ws"
            reconnect_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "ws://mixer.local:9000/ws");
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(config.transition_poll_ms, 50);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = ClientConfig::from_toml_str("endpoint = 12").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
