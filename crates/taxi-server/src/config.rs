//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taxi_settings::ServerSettings;

/// Runtime configuration for the taxi channel server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Server ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a silent client after this many milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue: usize,
    /// Overflow drops tolerated before a connection is evicted.
    pub max_total_drops: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            outbound_queue: 256,
            max_total_drops: 1024,
            max_message_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_connections: settings.max_connections,
            heartbeat_interval_ms: settings.heartbeat_interval_ms,
            heartbeat_timeout_ms: settings.heartbeat_timeout_ms,
            outbound_queue: settings.outbound_queue,
            max_total_drops: settings.max_total_drops,
            max_message_size: settings.max_message_size,
        }
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Silence tolerated before a client is closed.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms.max(1))
    }
}
