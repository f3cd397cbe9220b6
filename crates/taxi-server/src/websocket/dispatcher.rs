//! Trip event fan-out.

use std::sync::Arc;

use metrics::counter;
use taxi_core::{ChannelError, CloseCode, DeliveryError, OutboundMessage, TripEvent};
use tracing::{debug, warn};

use super::connection::Enqueued;
use super::registry::ConnectionRegistry;
use crate::metrics::{
    TRIP_EVENT_DELIVERIES_TOTAL, TRIP_EVENTS_PUBLISHED_TOTAL, WS_DELIVERY_FAILURES_TOTAL,
    WS_OUTBOUND_DROPS_TOTAL, WS_SLOW_CONSUMER_EVICTIONS_TOTAL,
};

/// Outcome of one [`EventDispatcher::publish`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections subscribed to the trip when the event was published.
    pub recipients: usize,
    /// Frames queued.
    pub delivered: usize,
    /// Recipients that had closed before the frame could be queued.
    pub failed: usize,
    /// Deliveries that displaced an older queued frame.
    pub dropped: usize,
    /// Recipients evicted as slow consumers by this publish.
    pub evicted: usize,
}

/// Fans trip events out to the connections subscribed to each trip.
pub struct EventDispatcher {
    registry: Arc<ConnectionRegistry>,
    max_total_drops: u64,
}

impl EventDispatcher {
    /// Create a dispatcher over `registry`.
    ///
    /// A connection whose lifetime overflow drops reach `max_total_drops`
    /// is closed with `1001`.
    pub fn new(registry: Arc<ConnectionRegistry>, max_total_drops: u64) -> Self {
        Self {
            registry,
            max_total_drops: max_total_drops.max(1),
        }
    }

    /// The registry this dispatcher reads from.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `event` to every connection subscribed to its trip.
    ///
    /// The event is serialized once and delivered against a single registry
    /// snapshot. A failed delivery to one connection is logged and counted;
    /// the remaining recipients are unaffected.
    pub fn publish(&self, event: &TripEvent) -> Result<PublishReport, ChannelError> {
        let frame = Arc::new(OutboundMessage::from(event).to_json()?);
        counter!(TRIP_EVENTS_PUBLISHED_TOTAL).increment(1);

        let mut report = PublishReport::default();
        for conn in self.registry.find_by_trip(&event.trip_id) {
            report.recipients += 1;
            match conn.send(Arc::clone(&frame)) {
                Ok(Enqueued::Queued) => report.delivered += 1,
                Ok(Enqueued::DroppedOldest) => {
                    report.delivered += 1;
                    report.dropped += 1;
                    counter!(WS_OUTBOUND_DROPS_TOTAL).increment(1);
                    let drops = conn.drop_count();
                    if drops >= self.max_total_drops {
                        warn!(conn_id = %conn.id(), drops, "evicting slow consumer");
                        if conn.close(CloseCode::GoingAway) {
                            report.evicted += 1;
                            counter!(WS_SLOW_CONSUMER_EVICTIONS_TOTAL).increment(1);
                        }
                    } else {
                        warn!(conn_id = %conn.id(), total_drops = drops, "outbound queue full, dropped oldest frame");
                    }
                }
                Err(e @ DeliveryError::Closed(_)) => {
                    report.failed += 1;
                    counter!(WS_DELIVERY_FAILURES_TOTAL).increment(1);
                    debug!(trip_id = %event.trip_id, error = %e, "delivery failed");
                }
            }
        }
        counter!(TRIP_EVENT_DELIVERIES_TOTAL)
            .increment(u64::try_from(report.delivered).unwrap_or(u64::MAX));

        debug!(
            trip_id = %event.trip_id,
            event = %event.event,
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed,
            "published trip event"
        );
        Ok(report)
    }

    /// Publish a batch in order; each event gets its own report.
    pub fn publish_all<'a>(
        &self,
        events: impl IntoIterator<Item = &'a TripEvent>,
    ) -> Vec<Result<PublishReport, ChannelError>> {
        events.into_iter().map(|e| self.publish(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::ClientConnection;
    use crate::websocket::registry::RegistrationHandle;
    use serde_json::{Value, json};
    use taxi_core::{ConnectionId, Identity, TripId};
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        dispatcher: EventDispatcher,
    }

    impl Fixture {
        fn new(max_total_drops: u64) -> Self {
            let registry = Arc::new(ConnectionRegistry::new());
            let dispatcher = EventDispatcher::new(Arc::clone(&registry), max_total_drops);
            Self {
                registry,
                dispatcher,
            }
        }

        fn subscribe(
            &self,
            id: &str,
            trip: &str,
            capacity: usize,
        ) -> (Arc<ClientConnection>, RegistrationHandle) {
            let conn = Arc::new(ClientConnection::new(
                ConnectionId::from(id),
                Identity::new(1, "user@example.com"),
                capacity,
                CancellationToken::new(),
            ));
            let handle = self.registry.register(Arc::clone(&conn));
            assert!(self.registry.bind_trip(&handle, Some(TripId::from(trip))));
            (conn, handle)
        }
    }

    fn drain(conn: &ClientConnection) -> Vec<Value> {
        let mut out = Vec::new();
        while conn.pending() > 0 {
            let frame = futures::executor::block_on(conn.recv()).unwrap();
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[test]
    fn event_reaches_only_its_trip() {
        let fx = Fixture::new(100);
        let (a, _) = fx.subscribe("A", "T1", 8);
        let (b, _) = fx.subscribe("B", "T2", 8);

        let event = TripEvent::new("T1", "location_update").with_payload(json!({"lat": 1.0}));
        let report = fx.dispatcher.publish(&event).unwrap();
        assert_eq!(report.recipients, 1);
        assert_eq!(report.delivered, 1);

        let got = drain(&a);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["event"], "location_update");
        assert_eq!(got[0]["trip_id"], "T1");
        assert_eq!(got[0]["payload"]["lat"], 1.0);
        assert!(drain(&b).is_empty());
    }

    #[test]
    fn unsubscribed_connection_receives_nothing() {
        let fx = Fixture::new(100);
        let (a, handle) = fx.subscribe("A", "T1", 8);
        assert!(fx.registry.bind_trip(&handle, None));
        let report = fx.dispatcher.publish(&TripEvent::new("T1", "x")).unwrap();
        assert_eq!(report.recipients, 0);
        assert!(drain(&a).is_empty());
    }

    #[test]
    fn same_trip_events_arrive_in_publish_order() {
        let fx = Fixture::new(100);
        let (a, _) = fx.subscribe("A", "T1", 64);
        for i in 0..10 {
            let event = TripEvent::new("T1", "tick").with_payload(json!({"seq": i}));
            let _ = fx.dispatcher.publish(&event).unwrap();
        }
        let seqs: Vec<i64> = drain(&a)
            .iter()
            .map(|v| v["payload"]["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn closed_recipient_does_not_abort_fanout() {
        let fx = Fixture::new(100);
        let (a, _) = fx.subscribe("A", "T1", 16);
        let (gone, _) = fx.subscribe("gone", "T1", 16);
        let (c, _) = fx.subscribe("C", "T1", 16);

        let batch: Vec<TripEvent> = (0..3)
            .map(|i| TripEvent::new("T1", "tick").with_payload(json!({"seq": i})))
            .collect();

        let first = fx.dispatcher.publish(&batch[0]).unwrap();
        assert_eq!(first.delivered, 3);

        // Abrupt close mid-batch, still registered.
        let _ = gone.close(CloseCode::Normal);
        let rest = fx.dispatcher.publish_all(&batch[1..]);
        for report in rest {
            let report = report.unwrap();
            assert_eq!(report.recipients, 3);
            assert_eq!(report.delivered, 2);
            assert_eq!(report.failed, 1);
        }

        assert_eq!(drain(&a).len(), 3);
        assert_eq!(drain(&c).len(), 3);
    }

    #[test]
    fn overflow_is_reported_and_does_not_block_others() {
        let fx = Fixture::new(100);
        let (slow, _) = fx.subscribe("slow", "T1", 1);
        let (fast, _) = fx.subscribe("fast", "T1", 16);

        let _ = fx.dispatcher.publish(&TripEvent::new("T1", "a")).unwrap();
        let report = fx.dispatcher.publish(&TripEvent::new("T1", "b")).unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.delivered, 2);

        let slow_events: Vec<_> = drain(&slow).into_iter().map(|v| v["event"].clone()).collect();
        assert_eq!(slow_events, [json!("b")]);
        assert_eq!(drain(&fast).len(), 2);
    }

    #[test]
    fn slow_consumer_evicted_after_max_drops() {
        let fx = Fixture::new(2);
        let (slow, _) = fx.subscribe("slow", "T1", 1);

        let mut evicted = 0;
        for i in 0..4 {
            let event = TripEvent::new("T1", "tick").with_payload(json!({"seq": i}));
            evicted += fx.dispatcher.publish(&event).unwrap().evicted;
        }
        assert_eq!(evicted, 1);
        assert_eq!(slow.close_code(), Some(CloseCode::GoingAway));
        assert!(slow.cancel_token().is_cancelled());
    }

    #[test]
    fn publish_with_no_subscribers() {
        let fx = Fixture::new(10);
        let report = fx.dispatcher.publish(&TripEvent::new("nobody", "x")).unwrap();
        assert_eq!(report, PublishReport::default());
    }
}
