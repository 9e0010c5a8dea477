//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files, and
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind host, port, limits).
    pub listener: ListenerConfig,

    /// Feature toggles consulted per request.
    pub features: FeatureConfig,

    /// Dispatcher-level deadlines.
    pub timeouts: TimeoutConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// TCP port to listen on. 0 picks an ephemeral port.
    pub port: u16,

    /// Maximum concurrent inbound connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// `host:port` string handed to the TCP bind call.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 10_000,
        }
    }
}

/// Boolean feature toggles.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureConfig {
    /// Gzip responses for clients that accept it.
    pub compression: bool,

    /// Accepted and logged; connection reuse toward backends is not implemented.
    pub keepalive: bool,

    /// When false, `If-Modified-Since` and `If-None-Match` are not forwarded.
    pub local_caching: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            compression: true,
            keepalive: true,
            local_caching: false,
        }
    }
}

/// Deadlines imposed by the dispatcher. The forwarding engine itself has none.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum time to wait for a response head. Unset means no deadline.
    pub response_head_secs: Option<u64>,

    /// How long shutdown waits for open connections to finish.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            response_head_secs: None,
            shutdown_grace_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
