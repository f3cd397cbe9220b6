//! Listener, connection, and logging settings.

use serde::{Deserialize, Serialize};
use taxi_core::logging::LogFormat;

/// Network and per-connection runtime settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Server ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a connection silent for this long, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue: usize,
    /// Evict a connection after this many overflow drops.
    pub max_total_drops: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_connections: 1000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            outbound_queue: 256,
            max_total_drops: 1024,
            max_message_size: 64 * 1024,
        }
    }
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level written to stderr.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 8000);
        assert_eq!(s.outbound_queue, 256);
        assert!(s.heartbeat_timeout_ms > s.heartbeat_interval_ms);
    }

    #[test]
    fn server_camel_case_keys() {
        let json = serde_json::to_value(ServerSettings::default()).unwrap();
        assert!(json.get("maxConnections").is_some());
        assert!(json.get("heartbeatIntervalMs").is_some());
        assert!(json.get("max_connections").is_none());
    }

    #[test]
    fn partial_server_json_fills_defaults() {
        let s: ServerSettings = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(s.port, 9000);
        assert_eq!(s.max_connections, 1000);
    }

    #[test]
    fn log_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(LogLevel::Error.as_filter_str(), "error");
    }

    #[test]
    fn logging_serde() {
        let logging: LoggingSettings =
            serde_json::from_str(r#"{"level":"debug","format":"json"}"#).unwrap();
        assert_eq!(logging.level, LogLevel::Debug);
        assert_eq!(logging.format, LogFormat::Json);
    }
}
