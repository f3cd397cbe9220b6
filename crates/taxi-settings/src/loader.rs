//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TaxiSettings::default()`]
//! 2. If `~/.taxi/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TAXI_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use taxi_core::logging::LogFormat;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{JwtAlgorithm, LogLevel, TaxiSettings};

/// Resolve the path to the settings file (`~/.taxi/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".taxi").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TaxiSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TaxiSettings> {
    let defaults = serde_json::to_value(TaxiSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TaxiSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TAXI_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut TaxiSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// - Integers must be valid and within the specified range
/// - Empty strings count as unset
/// - Invalid values are logged and ignored (fall back to file/default)
pub fn apply_overrides(settings: &mut TaxiSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvSource { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("TAXI_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("TAXI_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("TAXI_MAX_CONNECTIONS", |s| parse_usize_range(s, 1, 1_000_000)) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.parsed("TAXI_OUTBOUND_QUEUE", |s| parse_usize_range(s, 1, 65_536)) {
        settings.server.outbound_queue = v;
    }
    if let Some(v) = env.parsed("TAXI_HEARTBEAT_INTERVAL_MS", |s| {
        parse_u64_range(s, 100, 600_000)
    }) {
        settings.server.heartbeat_interval_ms = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("TAXI_JWT_SECRET") {
        settings.auth.jwt_secret = Some(v);
    }
    if let Some(v) = env.parsed("TAXI_JWT_ALGORITHM", JwtAlgorithm::parse) {
        settings.auth.algorithm = v;
    }
    if let Some(v) = env.string("TAXI_JWT_PUBLIC_KEY_PATH") {
        settings.auth.public_key_path = Some(v);
    }
    if let Some(v) = env.parsed("TAXI_TOKEN_LEEWAY_SECS", |s| parse_u64_range(s, 0, 3600)) {
        settings.auth.leeway_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.parsed("TAXI_LOG_LEVEL", LogLevel::parse) {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("TAXI_LOG_FORMAT", LogFormat::parse) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvSource<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}
