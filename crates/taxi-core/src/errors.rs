//! Channel error taxonomy.
//!
//! | Error | Scope | Outcome |
//! |-------|-------|---------|
//! | [`ChannelError::Authentication`] | one connection | closed with `4001` |
//! | [`ChannelError::Authorization`] | one connection | closed with `4003` |
//! | [`ChannelError::Delivery`] | one delivery | logged, fan-out continues |
//! | [`ChannelError::RegistryConflict`] | one registration | logged, prior entry replaced |
//!
//! Nothing here is process-fatal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ConnectionId, TripId};
use crate::messages::CloseCode;

/// Why a bearer token was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The token is absent or cannot be parsed.
    #[error("malformed token")]
    Malformed,
    /// The token is past its validity window.
    #[error("token expired")]
    Expired,
    /// Signature, algorithm, token type, or claims check failed.
    #[error("invalid token")]
    Invalid,
}

impl RejectionReason {
    /// Short label, as used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
        }
    }
}

/// Outbound delivery to a single connection failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The connection closed before the message could be queued.
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
}

/// Errors raised while serving a trip channel.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The handshake token was rejected.
    #[error("authentication failed: {0}")]
    Authentication(#[from] RejectionReason),

    /// The identity may not access the requested trip.
    #[error("trip {trip_id} is not accessible")]
    Authorization {
        /// Trip that was requested.
        trip_id: TripId,
    },

    /// Delivery to one connection failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// A connection id was registered twice; the newer entry won.
    #[error("connection {0} registered twice")]
    RegistryConflict(ConnectionId),

    /// An inbound frame did not match the control message schema.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An outbound message could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl ChannelError {
    /// The close code this error terminates a connection with, if it is
    /// terminal for the connection.
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Authentication(_) => Some(CloseCode::AuthenticationFailed),
            Self::Authorization { .. } => Some(CloseCode::AuthorizationFailed),
            _ => None,
        }
    }
}
