//! Auth error types.
//!
//! Token *rejections* are [`taxi_core::RejectionReason`]; these errors cover
//! key setup and token minting.

/// Errors that can occur while preparing keys or issuing tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Key material could not be loaded.
    #[error("invalid key material: {0}")]
    Key(String),

    /// The configured algorithm cannot sign (e.g. RS256 without a private key).
    #[error("signing not available: {0}")]
    SigningUnavailable(String),

    /// Encoding a token failed.
    #[error("failed to encode token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}
