//! The authenticated user behind a connection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User reference produced by a successful token validation.
///
/// Immutable once created; it lives as long as the connection it
/// authenticated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Numeric user id (the `id` claim).
    pub id: i64,
    /// Login name, an email address in practice (the `username` claim).
    pub username: String,
}

impl Identity {
    /// Create an identity.
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.username, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_username_and_id() {
        let identity = Identity::new(1, "user@example.com");
        assert_eq!(identity.to_string(), "user@example.com#1");
    }

    #[test]
    fn serde_shape() {
        let identity = Identity::new(7, "rider@example.com");
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["username"], "rider@example.com");
    }
}
