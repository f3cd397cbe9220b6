//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Call once at
/// startup, before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Handle backed by a recorder that is not installed globally.
///
/// Renders nothing; used where no process-wide recorder is wanted (tests,
/// embedded servers).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket upgrades accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Handshakes rejected with 4001 (counter, labels: reason).
pub const WS_AUTH_FAILURES_TOTAL: &str = "ws_auth_failures_total";
/// Subscriptions refused with 4003 (counter).
pub const WS_AUTHZ_FAILURES_TOTAL: &str = "ws_authz_failures_total";
/// Trip events handed to the dispatcher (counter).
pub const TRIP_EVENTS_PUBLISHED_TOTAL: &str = "trip_events_published_total";
/// Trip event frames queued to a connection (counter).
pub const TRIP_EVENT_DELIVERIES_TOTAL: &str = "trip_event_deliveries_total";
/// Deliveries that failed because the connection had closed (counter).
pub const WS_DELIVERY_FAILURES_TOTAL: &str = "ws_delivery_failures_total";
/// Frames discarded by drop-oldest backpressure (counter).
pub const WS_OUTBOUND_DROPS_TOTAL: &str = "ws_outbound_drops_total";
/// Connections evicted as slow consumers (counter).
pub const WS_SLOW_CONSUMER_EVICTIONS_TOTAL: &str = "ws_slow_consumer_evictions_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
