//! Handshake authentication capability.
//!
//! The connection handler never calls a validator directly; it is handed a
//! `dyn TokenAuthenticator` so tests and alternative identity providers can
//! be swapped in.

use async_trait::async_trait;
use taxi_core::{Identity, RejectionReason};

use crate::validator::TokenValidator;

/// Resolves a bearer token into an [`Identity`].
#[async_trait]
pub trait TokenAuthenticator: Send + Sync {
    /// Authenticate `token`, or say why it was rejected.
    async fn authenticate(&self, token: &str) -> Result<Identity, RejectionReason>;
}

/// [`TokenAuthenticator`] backed by local JWT verification.
#[derive(Debug)]
pub struct JwtAuthenticator {
    validator: TokenValidator,
}

impl JwtAuthenticator {
    /// Wrap a validator.
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl TokenAuthenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, RejectionReason> {
        self.validator.validate(token)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
