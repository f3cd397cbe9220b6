//! Demo trips and a simulated trip event producer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taxi_core::{Trip, TripEvent, TripId, TripStatus};
use taxi_server::{EventDispatcher, InMemoryTripRepository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Status changes happen every this many simulation steps.
const STEPS_PER_STATUS: u32 = 3;

/// Insert the demo trips and return their ids.
///
/// Rider 1 and driver 2 share the first trip; rider 3 has the second.
pub fn seed(repo: &InMemoryTripRepository) -> Vec<TripId> {
    let trips = [
        Trip::new("12 Main St", "34 Elm St").with_rider(1).with_driver(2),
        Trip::new("56 Oak Ave", "78 Pine Rd").with_rider(3),
    ];
    trips
        .into_iter()
        .map(|trip| {
            let id = trip.id.clone();
            info!(
                trip_id = %id,
                rider_id = ?trip.rider_id,
                driver_id = ?trip.driver_id,
                "seeded demo trip"
            );
            repo.insert(trip);
            id
        })
        .collect()
}

/// Publish simulated location updates and status changes until cancelled.
pub async fn simulate(
    repo: Arc<InMemoryTripRepository>,
    dispatcher: Arc<EventDispatcher>,
    trip_ids: Vec<TripId>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    let mut step: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = cancel.cancelled() => break,
        }
        step = step.wrapping_add(1);
        for trip_id in &trip_ids {
            for event in step_events(&repo, trip_id, step) {
                if let Err(e) = dispatcher.publish(&event) {
                    warn!(%trip_id, error = %e, "simulated event not published");
                }
            }
        }
    }
    debug!("trip simulation stopped");
}

/// Events for one simulation step of one trip.
fn step_events(repo: &InMemoryTripRepository, trip_id: &TripId, step: u32) -> Vec<TripEvent> {
    let Some(trip) = repo.get(trip_id) else {
        return Vec::new();
    };
    if trip.status == TripStatus::Completed {
        return Vec::new();
    }

    let offset = f64::from(step) * 0.001;
    let mut events = vec![
        TripEvent::new(trip_id.clone(), "location_update")
            .with_payload(json!({"lat": 40.7128 + offset, "lng": -74.0060 + offset})),
    ];
    if step % STEPS_PER_STATUS == 0 {
        if let Some(next) = trip.status.next() {
            events.extend(repo.update_status(trip_id, next));
        }
    }
    events
}
