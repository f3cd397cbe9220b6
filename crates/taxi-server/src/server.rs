//! `TaxiServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use taxi_auth::{TokenAuthenticator, bearer_token};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::routes::{RouteKind, RouteTable};
use crate::shutdown::ShutdownCoordinator;
use crate::trips::TripAccess;
use crate::websocket::consumer::TaxiConsumer;
use crate::websocket::dispatcher::EventDispatcher;
use crate::websocket::registry::ConnectionRegistry;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    consumer: Arc<TaxiConsumer>,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
    max_message_size: usize,
}

/// Query string accepted on the channel handshake.
#[derive(Debug, Default, Deserialize)]
struct HandshakeParams {
    token: Option<String>,
}

/// The taxi channel server.
pub struct TaxiServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<EventDispatcher>,
    consumer: Arc<TaxiConsumer>,
    shutdown: Arc<ShutdownCoordinator>,
    routes: RouteTable,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl TaxiServer {
    /// Create a server.
    ///
    /// The authenticator and the trip access check are injected here and
    /// shared by every connection.
    pub fn new(
        config: ServerConfig,
        authenticator: Arc<dyn TokenAuthenticator>,
        trips: Arc<dyn TripAccess>,
        metrics: PrometheusHandle,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&registry),
            config.max_total_drops,
        ));
        let consumer = Arc::new(TaxiConsumer::new(
            authenticator,
            trips,
            Arc::clone(&registry),
            config.clone(),
        ));
        Self {
            config,
            registry,
            dispatcher,
            consumer,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            routes: RouteTable::standard(),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router from the route table.
    pub fn router(&self) -> Router {
        let state = AppState {
            consumer: Arc::clone(&self.consumer),
            registry: Arc::clone(&self.registry),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            max_message_size: self.config.max_message_size,
        };

        let mut router = Router::new();
        for &(path, kind) in self.routes.entries() {
            router = match kind {
                RouteKind::TaxiChannel => router.route(path, get(ws_handler)),
                RouteKind::Health => router.route(path, get(health_handler)),
                RouteKind::Metrics => router.route(path, get(metrics_handler)),
            };
        }
        router
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which ends once [`ShutdownCoordinator::shutdown`] is called.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        info!(%local_addr, "taxi channel listening");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server stopped with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// The event dispatcher; trip event producers publish through it.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The route table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /taxi/: channel handshake.
///
/// A non-empty `token` query parameter wins over an `Authorization: Bearer`
/// header; an empty one counts as absent.
/// Upgrades beyond `max_connections`, or during shutdown, get 503.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HandshakeParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let Some(permit) = state.consumer.try_admit() else {
        warn!(
            active = state.consumer.active_connections(),
            "connection limit reached, refusing upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let token = params.token.filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_owned)
    });
    let consumer = state.consumer;
    let shutdown = state.shutdown.token();

    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            consumer.run(socket, token, shutdown, permit).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        state.registry.subscription_count(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trips::InMemoryTripRepository;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use taxi_core::{Identity, RejectionReason};
    use tower::ServiceExt;

    struct RejectAll;

    #[async_trait]
    impl TokenAuthenticator for RejectAll {
        async fn authenticate(&self, _token: &str) -> Result<Identity, RejectionReason> {
            Err(RejectionReason::Invalid)
        }
    }

    fn make_server() -> TaxiServer {
        TaxiServer::new(
            ServerConfig::default(),
            Arc::new(RejectAll),
            Arc::new(InMemoryTripRepository::new()),
            metrics::detached_handle(),
        )
    }

    async fn request(server: &TaxiServer, uri: &str) -> Response {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        server.router().oneshot(req).await.unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(server.registry().is_empty());
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let resp = request(&server, "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["subscriptions"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_reports_shutdown() {
        let server = make_server();
        server.shutdown().shutdown();
        let resp = request(&server, "/health").await;
        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "shutting_down");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let server = make_server();
        let resp = request(&server, "/metrics").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn channel_without_upgrade_is_rejected() {
        let server = make_server();
        for path in ["/taxi/", "/taxi"] {
            let resp = request(&server, path).await;
            assert!(resp.status().is_client_error(), "{path}: {}", resp.status());
            assert_ne!(resp.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let resp = request(&server, "/nonexistent").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
