//! Channel wire format.
//!
//! **Client → Server:**
//! ```json
//! { "action": "subscribe", "trip_id": "T1" }
//! ```
//!
//! **Server → Client:**
//! ```json
//! { "event": "location_update", "trip_id": "T1", "payload": { "lat": 1.0 } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ChannelError;
use crate::ids::TripId;
use crate::trips::TripEvent;

/// Control action requested by a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Start receiving events for a trip.
    Subscribe,
    /// Stop receiving events for a trip.
    Unsubscribe,
}

/// Inbound control message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Requested action.
    pub action: Action,
    /// Trip the action applies to.
    pub trip_id: TripId,
}

impl InboundMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ChannelError> {
        serde_json::from_str(text).map_err(|e| ChannelError::MalformedMessage(e.to_string()))
    }
}

/// Outbound event envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Event kind.
    pub event: String,
    /// Trip the event belongs to.
    pub trip_id: TripId,
    /// Event body.
    pub payload: Map<String, Value>,
}

/// Event name acknowledging a subscription.
pub const EVENT_SUBSCRIBED: &str = "subscribed";
/// Event name acknowledging an unsubscription.
pub const EVENT_UNSUBSCRIBED: &str = "unsubscribed";
/// Event name reporting a rejected inbound message.
pub const EVENT_ERROR: &str = "error";

impl OutboundMessage {
    /// Acknowledge a subscription to `trip_id`.
    pub fn subscribed(trip_id: TripId) -> Self {
        Self {
            event: EVENT_SUBSCRIBED.to_owned(),
            trip_id,
            payload: Map::new(),
        }
    }

    /// Acknowledge an unsubscription from `trip_id`.
    pub fn unsubscribed(trip_id: TripId) -> Self {
        Self {
            event: EVENT_UNSUBSCRIBED.to_owned(),
            trip_id,
            payload: Map::new(),
        }
    }

    /// Report an inbound message the server could not act on.
    pub fn error(trip_id: TripId, message: impl Into<String>) -> Self {
        let mut payload = Map::new();
        let _ = payload.insert("message".to_owned(), Value::String(message.into()));
        Self {
            event: EVENT_ERROR.to_owned(),
            trip_id,
            payload,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|e| ChannelError::Serialization(e.to_string()))
    }
}

impl From<TripEvent> for OutboundMessage {
    fn from(event: TripEvent) -> Self {
        Self {
            event: event.event,
            trip_id: event.trip_id,
            payload: event.payload,
        }
    }
}

impl From<&TripEvent> for OutboundMessage {
    fn from(event: &TripEvent) -> Self {
        Self::from(event.clone())
    }
}

/// WebSocket close codes used by the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// Normal closure.
    Normal,
    /// The server evicted the connection (heartbeat timeout, slow consumer).
    GoingAway,
    /// The bearer token was missing, malformed, expired, or invalid.
    AuthenticationFailed,
    /// The identity may not access the requested trip.
    AuthorizationFailed,
}

impl CloseCode {
    /// Numeric close code.
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::AuthenticationFailed => 4001,
            Self::AuthorizationFailed => 4003,
        }
    }

    /// Close reason sent with the frame.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Normal => "normal closure",
            Self::GoingAway => "going away",
            Self::AuthenticationFailed => "authentication failed",
            Self::AuthorizationFailed => "trip not accessible",
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn parse_subscribe() {
        let msg = InboundMessage::parse(r#"{"action":"subscribe","trip_id":"T1"}"#).unwrap();
        assert_eq!(msg.action, Action::Subscribe);
        assert_eq!(msg.trip_id.as_str(), "T1");
    }

    #[test]
    fn parse_unsubscribe() {
        let msg = InboundMessage::parse(r#"{"action":"unsubscribe","trip_id":"T2"}"#).unwrap();
        assert_eq!(msg.action, Action::Unsubscribe);
    }

    #[test]
    fn parse_unknown_action_fails() {
        let err = InboundMessage::parse(r#"{"action":"cancel","trip_id":"T1"}"#).unwrap_err();
        assert_matches!(err, ChannelError::MalformedMessage(_));
    }

    #[test]
    fn parse_missing_trip_fails() {
        let err = InboundMessage::parse(r#"{"action":"subscribe"}"#).unwrap_err();
        assert_matches!(err, ChannelError::MalformedMessage(_));
    }

    #[test]
    fn parse_garbage_fails() {
        assert!(InboundMessage::parse("not json").is_err());
    }

    #[test]
    fn outbound_envelope_shape() {
        let event = TripEvent::new("T1", "location_update").with_payload(json!({"lat": 2.0}));
        let json = OutboundMessage::from(&event).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, json!({"event": "location_update", "trip_id": "T1", "payload": {"lat": 2.0}}));
    }

    #[test]
    fn acknowledgements() {
        let ack = OutboundMessage::subscribed(TripId::from("T1"));
        assert_eq!(ack.event, EVENT_SUBSCRIBED);
        assert!(ack.payload.is_empty());
        let err = OutboundMessage::error(TripId::from("T1"), "not subscribed");
        assert_eq!(err.payload["message"], "not subscribed");
    }

    #[test]
    fn close_codes() {
        assert_eq!(CloseCode::Normal.code(), 1000);
        assert_eq!(u16::from(CloseCode::AuthenticationFailed), 4001);
        assert_eq!(u16::from(CloseCode::AuthorizationFailed), 4003);
        assert_eq!(CloseCode::GoingAway.code(), 1001);
    }
}
