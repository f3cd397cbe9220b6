//! Trip records and trip-state events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::TripId;

/// Lifecycle status of a trip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    /// A rider asked for a ride; no driver yet.
    #[default]
    Requested,
    /// A driver accepted and is on the way.
    Started,
    /// The rider is in the car.
    InProgress,
    /// The ride finished.
    Completed,
}

impl TripStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Started => "STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }

    /// The status a trip moves to next, `None` once completed.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Requested => Some(Self::Started),
            Self::Started => Some(Self::InProgress),
            Self::InProgress => Some(Self::Completed),
            Self::Completed => None,
        }
    }
}

/// A ride record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Trip id.
    pub id: TripId,
    /// Where the rider is picked up.
    pub pick_up_address: String,
    /// Where the rider is dropped off.
    pub drop_off_address: String,
    /// Current status.
    pub status: TripStatus,
    /// User id of the rider, if assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rider_id: Option<i64>,
    /// User id of the driver, if assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<i64>,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub updated: DateTime<Utc>,
}

impl Trip {
    /// Create a `REQUESTED` trip with a fresh id.
    pub fn new(pick_up_address: impl Into<String>, drop_off_address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TripId::new(),
            pick_up_address: pick_up_address.into(),
            drop_off_address: drop_off_address.into(),
            status: TripStatus::Requested,
            rider_id: None,
            driver_id: None,
            created: now,
            updated: now,
        }
    }

    /// Set the rider.
    #[must_use]
    pub fn with_rider(mut self, rider_id: i64) -> Self {
        self.rider_id = Some(rider_id);
        self
    }

    /// Set the driver.
    #[must_use]
    pub fn with_driver(mut self, driver_id: i64) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    /// Whether the user is the rider or the driver of this trip.
    pub fn involves(&self, user_id: i64) -> bool {
        self.rider_id == Some(user_id) || self.driver_id == Some(user_id)
    }
}

/// A trip state change, produced by trip-management code and fanned out to
/// every connection subscribed to the trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripEvent {
    /// Trip the event belongs to.
    pub trip_id: TripId,
    /// Event kind, e.g. `location_update` or `status_changed`.
    pub event: String,
    /// Event body. Always a JSON object on the wire.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl TripEvent {
    /// Create an event with an empty payload.
    pub fn new(trip_id: impl Into<TripId>, event: impl Into<String>) -> Self {
        Self {
            trip_id: trip_id.into(),
            event: event.into(),
            payload: Map::new(),
        }
    }

    /// Attach a payload. Non-object values are wrapped as `{"value": ...}`.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                let _ = map.insert("value".to_owned(), other);
                map
            }
        };
        self
    }

    /// Event announcing a status change of `trip`.
    pub fn status_changed(trip: &Trip) -> Self {
        Self::new(trip.id.clone(), "status_changed").with_payload(serde_json::json!({
            "status": trip.status.as_str(),
            "updated": trip.updated.to_rfc3339(),
        }))
    }
}
