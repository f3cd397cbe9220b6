//! Signing and verification keys.

use std::fmt;
use std::path::Path;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use crate::errors::AuthError;

/// Key material for one signing algorithm.
#[derive(Clone)]
pub enum KeyMaterial {
    /// HMAC-SHA256 with a shared secret.
    Hs256 {
        /// Shared secret bytes.
        secret: Vec<u8>,
    },
    /// RSA-SHA256. Verification needs only the public key.
    Rs256 {
        /// PEM-encoded public key.
        public_key_pem: Vec<u8>,
        /// PEM-encoded private key, required to issue tokens.
        private_key_pem: Option<Vec<u8>>,
    },
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hs256 { .. } => f.debug_struct("Hs256").finish_non_exhaustive(),
            Self::Rs256 {
                private_key_pem, ..
            } => f
                .debug_struct("Rs256")
                .field("can_sign", &private_key_pem.is_some())
                .finish_non_exhaustive(),
        }
    }
}

impl KeyMaterial {
    /// HS256 key from a shared secret.
    pub fn hs256(secret: impl Into<Vec<u8>>) -> Self {
        Self::Hs256 {
            secret: secret.into(),
        }
    }

    /// RS256 keys read from PEM files on disk.
    pub fn rs256_from_files(
        public_key_path: &Path,
        private_key_path: Option<&Path>,
    ) -> Result<Self, AuthError> {
        let read = |path: &Path| {
            std::fs::read(path)
                .map_err(|e| AuthError::Key(format!("failed to read {}: {e}", path.display())))
        };
        let public_key_pem = read(public_key_path)?;
        let private_key_pem = private_key_path.map(read).transpose()?;
        Ok(Self::Rs256 {
            public_key_pem,
            private_key_pem,
        })
    }

    /// Algorithm tokens must be signed with.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Hs256 { .. } => Algorithm::HS256,
            Self::Rs256 { .. } => Algorithm::RS256,
        }
    }

    /// Key used to verify signatures.
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        match self {
            Self::Hs256 { secret } => {
                if secret.is_empty() {
                    return Err(AuthError::Key("secret is empty".into()));
                }
                Ok(DecodingKey::from_secret(secret))
            }
            Self::Rs256 { public_key_pem, .. } => DecodingKey::from_rsa_pem(public_key_pem)
                .map_err(|e| AuthError::Key(format!("bad RSA public key: {e}"))),
        }
    }

    /// Key used to sign tokens.
    pub fn encoding_key(&self) -> Result<EncodingKey, AuthError> {
        match self {
            Self::Hs256 { secret } => {
                if secret.is_empty() {
                    return Err(AuthError::Key("secret is empty".into()));
                }
                Ok(EncodingKey::from_secret(secret))
            }
            Self::Rs256 {
                private_key_pem: Some(pem),
                ..
            } => EncodingKey::from_rsa_pem(pem)
                .map_err(|e| AuthError::Key(format!("bad RSA private key: {e}"))),
            Self::Rs256 {
                private_key_pem: None,
                ..
            } => Err(AuthError::SigningUnavailable(
                "RS256 configured without a private key".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn hs256_algorithm() {
        let key = KeyMaterial::hs256("secret");
        assert_eq!(key.algorithm(), Algorithm::HS256);
        assert!(key.decoding_key().is_ok());
        assert!(key.encoding_key().is_ok());
    }

    #[test]
    fn empty_secret_rejected() {
        let key = KeyMaterial::hs256(Vec::new());
        assert_matches!(key.decoding_key().map(|_| ()), Err(AuthError::Key(_)));
        assert_matches!(key.encoding_key().map(|_| ()), Err(AuthError::Key(_)));
    }

    #[test]
    fn rs256_garbage_pem_rejected() {
        let key = KeyMaterial::Rs256 {
            public_key_pem: b"not a pem".to_vec(),
            private_key_pem: None,
        };
        assert_eq!(key.algorithm(), Algorithm::RS256);
        assert_matches!(key.decoding_key().map(|_| ()), Err(AuthError::Key(_)));
    }

    #[test]
    fn rs256_without_private_key_cannot_sign() {
        let key = KeyMaterial::Rs256 {
            public_key_pem: Vec::new(),
            private_key_pem: None,
        };
        assert_matches!(key.encoding_key().map(|_| ()), Err(AuthError::SigningUnavailable(_)));
    }

    #[test]
    fn missing_key_file() {
        let err = KeyMaterial::rs256_from_files(Path::new("/nonexistent/key.pem"), None).unwrap_err();
        assert_matches!(err, AuthError::Key(msg) if msg.contains("/nonexistent/key.pem"));
    }

    #[test]
    fn debug_redacts_secret() {
        let key = KeyMaterial::hs256("super-secret");
        assert!(!format!("{key:?}").contains("super-secret"));
    }
}
