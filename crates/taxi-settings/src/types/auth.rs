//! Token verification settings.

use serde::{Deserialize, Serialize};

/// JWT signing algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    /// HMAC-SHA256 with a shared secret.
    #[default]
    Hs256,
    /// RSA-SHA256 with a PEM key pair.
    Rs256,
}

impl JwtAlgorithm {
    /// Parse an algorithm name (`HS256` or `RS256`, case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "HS256" => Some(Self::Hs256),
            "RS256" => Some(Self::Rs256),
            _ => None,
        }
    }
}

/// Token verification settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Signing algorithm.
    pub algorithm: JwtAlgorithm,
    /// Shared secret for HS256.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    /// PEM public key path for RS256.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<String>,
    /// PEM private key path for RS256; only needed to issue tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,
    /// Seconds a token is still accepted past its `exp`.
    pub leeway_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_wire_names() {
        assert_eq!(serde_json::to_value(JwtAlgorithm::Rs256).unwrap(), "RS256");
        let parsed: JwtAlgorithm = serde_json::from_str("\"HS256\"").unwrap();
        assert_eq!(parsed, JwtAlgorithm::Hs256);
    }

    #[test]
    fn algorithm_parse() {
        assert_eq!(JwtAlgorithm::parse("rs256"), Some(JwtAlgorithm::Rs256));
        assert_eq!(JwtAlgorithm::parse("ES256"), None);
    }

    #[test]
    fn secret_omitted_when_unset() {
        let json = serde_json::to_value(AuthSettings::default()).unwrap();
        assert!(json.get("jwtSecret").is_none());
        assert_eq!(json["leewaySecs"], 0);
    }
}
