//! JWT payload.

use serde::{Deserialize, Serialize};
use taxi_core::Identity;

/// Kind of token. Only `access` tokens may open a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived token presented on every request.
    Access,
    /// Long-lived token exchanged for a new access token.
    Refresh,
}

/// Claims carried in the token payload.
///
/// Besides the registered `exp`/`iat`/`jti` claims, the payload embeds the
/// user's `id`, `username`, `first_name`, and `last_name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Access or refresh.
    pub token_type: TokenType,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Unique token id.
    pub jti: String,
    /// User id.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Given name.
    #[serde(default)]
    pub first_name: String,
    /// Family name.
    #[serde(default)]
    pub last_name: String,
}

impl Claims {
    /// The identity embedded in the claims.
    pub fn identity(&self) -> Identity {
        Identity::new(self.id, self.username.clone())
    }
}
