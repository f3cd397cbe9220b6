//! Trip access checks and the in-memory trip store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use taxi_core::{Identity, Trip, TripEvent, TripId, TripStatus};

/// Decides whether an identity may watch a trip.
#[async_trait]
pub trait TripAccess: Send + Sync {
    /// Whether `identity` may subscribe to `trip_id`.
    async fn can_access_trip(&self, identity: &Identity, trip_id: &TripId) -> bool;
}

/// Trip records held in memory.
///
/// A trip is accessible to its rider and its driver; unknown trips are
/// accessible to no one.
#[derive(Default)]
pub struct InMemoryTripRepository {
    trips: RwLock<HashMap<TripId, Trip>>,
}

impl InMemoryTripRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a trip.
    pub fn insert(&self, trip: Trip) {
        let _ = self.trips.write().insert(trip.id.clone(), trip);
    }

    /// Fetch a trip by id.
    pub fn get(&self, trip_id: &TripId) -> Option<Trip> {
        self.trips.read().get(trip_id).cloned()
    }

    /// Trips where the user is rider or driver, oldest first.
    pub fn list_for_user(&self, user_id: i64) -> Vec<Trip> {
        let mut trips: Vec<Trip> = self
            .trips
            .read()
            .values()
            .filter(|t| t.involves(user_id))
            .cloned()
            .collect();
        trips.sort_by_key(|t| t.created);
        trips
    }

    /// Change a trip's status and return the matching `status_changed`
    /// event, ready to publish.
    pub fn update_status(&self, trip_id: &TripId, status: TripStatus) -> Option<TripEvent> {
        let mut trips = self.trips.write();
        let trip = trips.get_mut(trip_id)?;
        trip.status = status;
        trip.updated = Utc::now();
        Some(TripEvent::status_changed(trip))
    }

    /// Number of stored trips.
    pub fn len(&self) -> usize {
        self.trips.read().len()
    }

    /// Whether the repository is empty.
    pub fn is_empty(&self) -> bool {
        self.trips.read().is_empty()
    }
}

#[async_trait]
impl TripAccess for InMemoryTripRepository {
    async fn can_access_trip(&self, identity: &Identity, trip_id: &TripId) -> bool {
        self.trips
            .read()
            .get(trip_id)
            .is_some_and(|t| t.involves(identity.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rider() -> Identity {
        Identity::new(1, "rider@example.com")
    }

    fn driver() -> Identity {
        Identity::new(2, "driver@example.com")
    }

    #[tokio::test]
    async fn rider_and_driver_can_access() {
        let repo = InMemoryTripRepository::new();
        let trip = Trip::new("A", "B").with_rider(1).with_driver(2);
        let id = trip.id.clone();
        repo.insert(trip);

        assert!(repo.can_access_trip(&rider(), &id).await);
        assert!(repo.can_access_trip(&driver(), &id).await);
        assert!(!repo.can_access_trip(&Identity::new(3, "x@example.com"), &id).await);
    }

    #[tokio::test]
    async fn unknown_trip_is_inaccessible() {
        let repo = InMemoryTripRepository::new();
        assert!(!repo.can_access_trip(&rider(), &TripId::from("missing")).await);
    }

    #[test]
    fn list_for_user_filters() {
        let repo = InMemoryTripRepository::new();
        repo.insert(Trip::new("A", "B").with_rider(1));
        repo.insert(Trip::new("C", "D").with_rider(5).with_driver(1));
        repo.insert(Trip::new("E", "F").with_rider(9));
        assert_eq!(repo.list_for_user(1).len(), 2);
        assert_eq!(repo.list_for_user(9).len(), 1);
        assert!(repo.list_for_user(42).is_empty());
        assert_eq!(repo.len(), 3);
    }

    #[test]
    fn update_status_yields_event() {
        let repo = InMemoryTripRepository::new();
        let trip = Trip::new("A", "B").with_rider(1);
        let id = trip.id.clone();
        repo.insert(trip);

        let event = repo.update_status(&id, TripStatus::InProgress).unwrap();
        assert_eq!(event.trip_id, id);
        assert_eq!(event.payload["status"], "IN_PROGRESS");
        assert_eq!(repo.get(&id).unwrap().status, TripStatus::InProgress);
    }

    #[test]
    fn update_unknown_trip() {
        let repo = InMemoryTripRepository::new();
        assert!(repo.update_status(&TripId::from("nope"), TripStatus::Completed).is_none());
    }
}
