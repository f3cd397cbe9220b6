//! # taxi-auth
//!
//! Bearer token handling for the trip channel.
//!
//! - [`TokenValidator`]: decodes and verifies a compact JWT, returning the
//!   [`Identity`](taxi_core::Identity) in its claims or a
//!   [`RejectionReason`](taxi_core::RejectionReason)
//! - [`TokenIssuer`]: mints the `access`/`refresh` pair handed out at login
//! - [`TokenAuthenticator`]: the async capability the connection handler is
//!   constructed with; [`JwtAuthenticator`] is the JWT-backed implementation
//!
//! Key material is supplied by the caller as [`KeyMaterial`] (HS256 shared
//! secret or RS256 PEM keys).

#![deny(unsafe_code)]

pub mod authenticator;
pub mod claims;
pub mod errors;
pub mod issuer;
pub mod keys;
pub mod validator;

pub use authenticator::{JwtAuthenticator, TokenAuthenticator, bearer_token};
pub use claims::{Claims, TokenType};
pub use errors::AuthError;
pub use issuer::{TokenIssuer, TokenPair, UserProfile};
pub use keys::KeyMaterial;
pub use validator::TokenValidator;
