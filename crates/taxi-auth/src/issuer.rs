//! Token issuance.

use std::fmt;

use jsonwebtoken::{EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claims::{Claims, TokenType};
use crate::errors::AuthError;
use crate::keys::KeyMaterial;

/// Lifetime of an access token in seconds.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 5 * 60;
/// Lifetime of a refresh token in seconds.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// User fields embedded into issued tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User id.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
}

impl UserProfile {
    /// Create a profile.
    pub fn new(
        id: i64,
        username: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// Access and refresh tokens handed out together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived token accepted by the channel.
    pub access: String,
    /// Long-lived token for obtaining new access tokens.
    pub refresh: String,
}

/// Mints signed tokens.
pub struct TokenIssuer {
    key: EncodingKey,
    header: Header,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("alg", &self.header.alg)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Build an issuer. Fails if the key material cannot sign.
    pub fn new(keys: &KeyMaterial) -> Result<Self, AuthError> {
        Ok(Self {
            key: keys.encoding_key()?,
            header: Header::new(keys.algorithm()),
        })
    }

    /// Issue one token of the given type, valid for `ttl_secs` from `now`.
    pub fn issue(
        &self,
        profile: &UserProfile,
        token_type: TokenType,
        now: i64,
        ttl_secs: i64,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            token_type,
            exp: now + ttl_secs,
            iat: now,
            jti: Uuid::new_v4().simple().to_string(),
            id: profile.id,
            username: profile.username.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
        };
        Ok(jsonwebtoken::encode(&self.header, &claims, &self.key)?)
    }

    /// Issue an access/refresh pair as of `now`.
    pub fn issue_pair(&self, profile: &UserProfile, now: i64) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access: self.issue(profile, TokenType::Access, now, ACCESS_TOKEN_TTL_SECS)?,
            refresh: self.issue(profile, TokenType::Refresh, now, REFRESH_TOKEN_TTL_SECS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::TokenValidator;
    use jsonwebtoken::{DecodingKey, Validation};
    use taxi_core::RejectionReason;

    const NOW: i64 = 1_700_000_000;

    fn profile() -> UserProfile {
        UserProfile::new(7, "driver@example.com", "Dee", "Driver")
    }

    fn decode(token: &str) -> Claims {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(b"k"), &validation)
            .unwrap()
            .claims
    }

    #[test]
    fn pair_has_expected_lifetimes() {
        let issuer = TokenIssuer::new(&KeyMaterial::hs256("k")).unwrap();
        let pair = issuer.issue_pair(&profile(), NOW).unwrap();

        let access = decode(&pair.access);
        assert_eq!(access.token_type, TokenType::Access);
        assert_eq!(access.iat, NOW);
        assert_eq!(access.exp, NOW + ACCESS_TOKEN_TTL_SECS);
        assert_eq!(access.first_name, "Dee");

        let refresh = decode(&pair.refresh);
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert_eq!(refresh.exp, NOW + REFRESH_TOKEN_TTL_SECS);
        assert_ne!(access.jti, refresh.jti);
    }

    #[test]
    fn refresh_token_does_not_open_channel() {
        let keys = KeyMaterial::hs256("k");
        let pair = TokenIssuer::new(&keys).unwrap().issue_pair(&profile(), NOW).unwrap();
        let validator = TokenValidator::new(&keys).unwrap();
        assert_eq!(validator.validate_at(&pair.refresh, NOW), Err(RejectionReason::Invalid));
        assert!(validator.validate_at(&pair.access, NOW).is_ok());
    }

    #[test]
    fn access_token_expires_after_ttl() {
        let keys = KeyMaterial::hs256("k");
        let pair = TokenIssuer::new(&keys).unwrap().issue_pair(&profile(), NOW).unwrap();
        let validator = TokenValidator::new(&keys).unwrap();
        let later = NOW + ACCESS_TOKEN_TTL_SECS + 1;
        assert_eq!(validator.validate_at(&pair.access, later), Err(RejectionReason::Expired));
    }

    #[test]
    fn rs256_without_private_key_cannot_issue() {
        let keys = KeyMaterial::Rs256 {
            public_key_pem: Vec::new(),
            private_key_pem: None,
        };
        assert!(matches!(
            TokenIssuer::new(&keys),
            Err(AuthError::SigningUnavailable(_))
        ));
    }
}
