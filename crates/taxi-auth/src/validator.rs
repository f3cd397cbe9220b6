//! Token validation.
//!
//! Checks run in a fixed order so the rejection reason is deterministic:
//!
//! 1. Structure: three segments, a parseable header, and a base64url
//!    payload holding a JSON object ([`RejectionReason::Malformed`])
//! 2. Signature and algorithm ([`RejectionReason::Invalid`])
//! 3. Claims shape and `token_type == "access"` ([`RejectionReason::Invalid`])
//! 4. Expiry against the clock plus leeway ([`RejectionReason::Expired`])
//!
//! A token that is both forged and expired is therefore `Invalid`.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, Validation};
use taxi_core::{Identity, RejectionReason};
use tracing::debug;

use crate::claims::{Claims, TokenType};
use crate::errors::AuthError;
use crate::keys::KeyMaterial;

/// Default clock-skew allowance in seconds.
pub const DEFAULT_LEEWAY_SECS: u64 = 0;

/// Verifies bearer tokens and extracts the [`Identity`] they carry.
///
/// Stateless apart from its key, so one validator is shared by every
/// connection.
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
    leeway_secs: u64,
}

impl fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenValidator")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    /// Build a validator for the given key material.
    pub fn new(keys: &KeyMaterial) -> Result<Self, AuthError> {
        let mut validation = Validation::new(keys.algorithm());
        // Expiry is checked after the signature, see `validate_at`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Ok(Self {
            key: keys.decoding_key()?,
            validation,
            leeway_secs: DEFAULT_LEEWAY_SECS,
        })
    }

    /// Accept tokens up to `leeway_secs` past their `exp`.
    #[must_use]
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Validate `token` against the current time.
    pub fn validate(&self, token: &str) -> Result<Identity, RejectionReason> {
        self.validate_at(token, chrono::Utc::now().timestamp())
    }

    /// Validate `token` as of `now` (seconds since the Unix epoch).
    pub fn validate_at(&self, token: &str, now: i64) -> Result<Identity, RejectionReason> {
        if token.is_empty() {
            return Err(RejectionReason::Malformed);
        }
        if let Err(e) = jsonwebtoken::decode_header(token) {
            debug!(error = %e, "token header rejected");
            return Err(RejectionReason::Malformed);
        }
        check_payload_encoding(token)?;

        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            let reason = classify(e.kind());
            debug!(error = %e, ?reason, "token rejected");
            reason
        })?;
        let claims = data.claims;

        if claims.token_type != TokenType::Access {
            debug!(token_type = ?claims.token_type, "non-access token rejected");
            return Err(RejectionReason::Invalid);
        }

        let leeway = i64::try_from(self.leeway_secs).unwrap_or(i64::MAX);
        if now > claims.exp.saturating_add(leeway) {
            debug!(exp = claims.exp, now, "token expired");
            return Err(RejectionReason::Expired);
        }

        Ok(claims.identity())
    }
}

/// Payload encoding is checked ahead of the signature, which `decode`
/// verifies before it looks at the claims.
fn check_payload_encoding(token: &str) -> Result<(), RejectionReason> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        debug!("token does not have three segments");
        return Err(RejectionReason::Malformed);
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|e| {
        debug!(error = %e, "token payload is not base64url");
        RejectionReason::Malformed
    })?;
    serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&bytes)
        .map(drop)
        .map_err(|e| {
            debug!(error = %e, "token payload is not a JSON object");
            RejectionReason::Malformed
        })
}

fn classify(kind: &ErrorKind) -> RejectionReason {
    match kind {
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
            RejectionReason::Malformed
        }
        ErrorKind::ExpiredSignature => RejectionReason::Expired,
        _ => RejectionReason::Invalid,
    }
}
