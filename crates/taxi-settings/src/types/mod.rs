//! Settings types.
//!
//! Every struct uses `#[serde(rename_all = "camelCase", default)]` so a
//! partial `settings.json` deserializes with compiled defaults filling the
//! gaps.

mod auth;
mod server;

pub use auth::{AuthSettings, JwtAlgorithm};
pub use server::{LogLevel, LoggingSettings, ServerSettings};

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaxiSettings {
    /// Listener and connection settings.
    pub server: ServerSettings,
    /// Token verification settings.
    pub auth: AuthSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        let settings: TaxiSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, TaxiSettings::default());
    }

    #[test]
    fn top_level_keys() {
        let json = serde_json::to_value(TaxiSettings::default()).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert!(keys.contains(&"server"));
        assert!(keys.contains(&"auth"));
        assert!(keys.contains(&"logging"));
    }
}
