//! Client configuration with TOML file support.

use lao_network::{NetworkConfig, ReconnectPolicy, DEFAULT_DEDUP_CAPACITY};
use lao_witness::WitnessPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::NodeError;

/// Configuration for a LAO client.
///
/// Can be loaded from a TOML file via [`ClientConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket URLs of the servers to connect to.
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,

    /// Where subscribed channels are persisted. In memory when unset.
    #[serde(default)]
    pub subscriptions_file: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Message ids remembered for cross-server deduplication.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Messages that may wait for a missing dependency at once.
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,

    /// Seconds a parked message waits before it is dropped.
    #[serde(default = "default_pending_max_age_secs")]
    pub pending_max_age_secs: i64,

    /// Queued messages per channel worker before submitters wait.
    #[serde(default = "default_channel_queue_depth")]
    pub channel_queue_depth: usize,

    /// Seconds to wait for a server answer.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Backoff between publication attempts.
    #[serde(default)]
    pub retry: BackoffConfig,

    /// Backoff between reconnect attempts.
    #[serde(default = "default_reconnect")]
    pub reconnect: BackoffConfig,

    /// `object#action` (or `object#*`) pairs that skip witnessing.
    #[serde(default)]
    pub witness_exempt: WitnessPolicy,

    /// Whether to collect Prometheus metrics.
    #[serde(default)]
    pub enable_metrics: bool,
}

/// Bounded exponential backoff, in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Attempts before giving up; unset retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_servers() -> Vec<String> {
    vec!["ws://127.0.0.1:9000/client".to_string()]
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

fn default_pending_capacity() -> usize {
    10_000
}

fn default_pending_max_age_secs() -> i64 {
    600
}

fn default_channel_queue_depth() -> usize {
    1024
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> Option<u32> {
    Some(8)
}

fn default_reconnect() -> BackoffConfig {
    BackoffConfig {
        initial_backoff_ms: 100,
        max_backoff_ms: 30_000,
        max_attempts: None,
    }
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            servers: self.servers.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            reconnect: ReconnectPolicy {
                initial: Duration::from_millis(self.reconnect.initial_backoff_ms),
                max: Duration::from_millis(self.reconnect.max_backoff_ms),
                max_attempts: self.reconnect.max_attempts,
            },
            dedup_capacity: self.dedup_capacity,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_millis(self.retry.initial_backoff_ms),
            max: Duration::from_millis(self.retry.max_backoff_ms),
            max_attempts: self.retry.max_attempts,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            subscriptions_file: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            dedup_capacity: default_dedup_capacity(),
            pending_capacity: default_pending_capacity(),
            pending_max_age_secs: default_pending_max_age_secs(),
            channel_queue_depth: default_channel_queue_depth(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: BackoffConfig::default(),
            reconnect: default_reconnect(),
            witness_exempt: WitnessPolicy::default(),
            enable_metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = ClientConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = ClientConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = ClientConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.servers, default_servers());
        assert_eq!(config.pending_capacity, 10_000);
        assert_eq!(config.log_format, "human");
        assert_eq!(config.reconnect.max_attempts, None);
        assert_eq!(config.witness_exempt, WitnessPolicy::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            servers = ["ws://a:9000/client", "ws://b:9000/client"]
            pending_capacity = 5
            witness_exempt = ["chirp#*"]

            [retry]
            initial_backoff_ms = 10
            max_attempts = 3
        "#;
        let config = ClientConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.pending_capacity, 5);
        assert_eq!(config.retry.initial_backoff_ms, 10);
        assert_eq!(config.retry.max_backoff_ms, 30_000);
        assert_eq!(config.retry_policy().max_attempts, Some(3));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.witness_exempt.entries(), vec!["chirp#*".to_string()]);
    }

    #[test]
    fn bad_witness_entry_is_a_config_error() {
        let err = ClientConfig::from_toml_str(r#"witness_exempt = ["nonsense"]"#).unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[test]
    fn network_config_carries_timeouts() {
        let config = ClientConfig {
            request_timeout_secs: 3,
            ..ClientConfig::default()
        };
        let network = config.network_config();
        assert_eq!(network.request_timeout, Duration::from_secs(3));
        assert_eq!(network.reconnect.initial, Duration::from_millis(100));
        assert_eq!(network.servers, config.servers);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"").unwrap();
        let config = ClientConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = ClientConfig::from_toml_file("/nonexistent/lao.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
