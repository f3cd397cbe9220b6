//! Taxi channel consumer: the handshake, the per-connection subscription
//! state machine, and the socket read/write loops.
//!
//! A connection moves `Connecting -> Authenticated -> Subscribed(trip)` and
//! ends in `Closed`. `Connecting` is the span of [`TaxiConsumer::connect`];
//! a [`ConsumerSession`] only exists once the token has been accepted.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use taxi_auth::TokenAuthenticator;
use taxi_core::{
    Action, ChannelError, CloseCode, ConnectionId, Identity, InboundMessage, OutboundMessage,
    RejectionReason, TripId,
};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::registry::{ConnectionRegistry, RegistrationHandle};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_AUTH_FAILURES_TOTAL, WS_AUTHZ_FAILURES_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
};
use crate::trips::TripAccess;

/// How long the writer gets to flush queued frames after close.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a session is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Token accepted, no trip bound.
    Authenticated,
    /// Receiving events for one trip.
    Subscribed(TripId),
    /// Terminal.
    Closed,
}

/// What the read loop should do after an inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Keep reading.
    Continue,
    /// Close the socket with this code.
    Close(CloseCode),
}

/// Slot counted against `max_connections`, released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let _ = self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Accepts taxi channel connections.
pub struct TaxiConsumer {
    authenticator: Arc<dyn TokenAuthenticator>,
    trips: Arc<dyn TripAccess>,
    registry: Arc<ConnectionRegistry>,
    config: ServerConfig,
    active: Arc<AtomicUsize>,
}

impl TaxiConsumer {
    /// Create a consumer that registers its connections in `registry`.
    pub fn new(
        authenticator: Arc<dyn TokenAuthenticator>,
        trips: Arc<dyn TripAccess>,
        registry: Arc<ConnectionRegistry>,
        config: ServerConfig,
    ) -> Self {
        Self {
            authenticator,
            trips,
            registry,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sockets currently held, authenticated or not.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Reserve a connection slot, or `None` at `max_connections`.
    pub fn try_admit(&self) -> Option<ConnectionPermit> {
        let max = self.config.max_connections;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| ConnectionPermit {
                active: Arc::clone(&self.active),
            })
    }

    /// Authenticate a handshake and register the connection.
    ///
    /// A missing or empty token is [`RejectionReason::Malformed`]. On
    /// success the connection is registered with no trip bound.
    pub async fn connect(
        &self,
        token: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<ConsumerSession, RejectionReason> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(RejectionReason::Malformed)?;
        let identity = self.authenticator.authenticate(token).await?;

        let connection = Arc::new(ClientConnection::new(
            ConnectionId::new(),
            identity,
            self.config.outbound_queue,
            cancel,
        ));
        let handle = self.registry.register(Arc::clone(&connection));
        Ok(ConsumerSession {
            connection,
            handle,
            state: SessionState::Authenticated,
            registry: Arc::clone(&self.registry),
            trips: Arc::clone(&self.trips),
        })
    }

    /// Drive one upgraded socket until it closes.
    ///
    /// `shutdown` is the server-wide token; the connection gets a child of
    /// it, so a server shutdown closes the socket with `1000`.
    #[instrument(skip_all, fields(conn_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        mut socket: WebSocket,
        token: Option<String>,
        shutdown: CancellationToken,
        _permit: ConnectionPermit,
    ) {
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        let started = Instant::now();

        match self.connect(token.as_deref(), shutdown.child_token()).await {
            Ok(session) => {
                let _ = Span::current()
                    .record("conn_id", tracing::field::display(session.connection.id()));
                info!(user_id = session.identity().id, "client connected");
                self.serve(socket, session).await;
            }
            Err(reason) => {
                counter!(WS_AUTH_FAILURES_TOTAL, "reason" => reason.as_str()).increment(1);
                info!(%reason, "handshake rejected");
                let _ = socket.send(close_message(CloseCode::AuthenticationFailed)).await;
            }
        }

        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    }

    async fn serve(&self, socket: WebSocket, mut session: ConsumerSession) {
        let (ws_tx, mut ws_rx) = socket.split();
        let conn = Arc::clone(&session.connection);
        let cancel = conn.cancel_token().clone();

        let writer = tokio::spawn(write_loop(
            ws_tx,
            Arc::clone(&conn),
            self.config.heartbeat_interval(),
        ));
        let writer_abort = writer.abort_handle();

        let heartbeat = tokio::spawn({
            let conn = Arc::clone(&conn);
            let interval = self.config.heartbeat_interval();
            let timeout = self.config.heartbeat_timeout();
            let cancel = cancel.clone();
            async move {
                if run_heartbeat(Arc::clone(&conn), interval, timeout, cancel).await
                    == HeartbeatResult::TimedOut
                {
                    warn!(silent_for = ?conn.last_seen_elapsed(), "heartbeat timeout, closing");
                    let _ = conn.close(CloseCode::GoingAway);
                }
            }
        });

        loop {
            tokio::select! {
                frame = ws_rx.next() => {
                    let Some(Ok(msg)) = frame else {
                        debug!("socket ended");
                        break;
                    };
                    conn.mark_alive();
                    let step = match &msg {
                        Message::Text(text) => session.handle_text(text.as_str()).await,
                        Message::Binary(data) => match std::str::from_utf8(data) {
                            Ok(text) => session.handle_text(text).await,
                            Err(_) => {
                                debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                                Step::Continue
                            }
                        },
                        Message::Close(_) => {
                            info!("client sent close frame");
                            break;
                        }
                        Message::Ping(_) | Message::Pong(_) => Step::Continue,
                    };
                    if let Step::Close(code) = step {
                        let _ = conn.close(code);
                        break;
                    }
                }
                () = cancel.cancelled() => break,
            }
        }

        // Client close and server shutdown arrive here with no code set.
        let _ = conn.close(CloseCode::Normal);
        let _ = session.close();
        let _ = heartbeat.await;
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
            warn!("writer did not drain in time, aborting");
            writer_abort.abort();
        }

        info!(
            close_code = conn.close_code().map(CloseCode::code),
            age_secs = conn.age().as_secs(),
            "client disconnected"
        );
    }
}

/// Forward queued frames to the socket and send periodic pings.
///
/// Ends with a close frame carrying the connection's close code once the
/// queue is closed and drained.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    conn: Arc<ClientConnection>,
    ping_every: Duration,
) {
    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + ping_every, ping_every);

    loop {
        tokio::select! {
            frame = conn.recv() => match frame {
                Some(text) => {
                    if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                        let _ = conn.close(CloseCode::Normal);
                        return;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    let _ = conn.close(CloseCode::Normal);
                    return;
                }
            }
        }
    }

    let code = conn.close_code().unwrap_or(CloseCode::Normal);
    let _ = ws_tx.send(close_message(code)).await;
    let _ = ws_tx.close().await;
}

fn close_message(code: CloseCode) -> Message {
    Message::Close(Some(CloseFrame {
        code: code.code(),
        reason: Utf8Bytes::from_static(code.reason()),
    }))
}

/// One authenticated connection's subscription state.
///
/// Dropping the session unregisters the connection.
pub struct ConsumerSession {
    connection: Arc<ClientConnection>,
    handle: RegistrationHandle,
    state: SessionState,
    registry: Arc<ConnectionRegistry>,
    trips: Arc<dyn TripAccess>,
}

impl std::fmt::Debug for ConsumerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerSession")
            .field("connection", &self.connection.id())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ConsumerSession {
    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.connection
    }

    /// The authenticated user.
    pub fn identity(&self) -> &Identity {
        self.connection.identity()
    }

    /// Handle one inbound text frame.
    ///
    /// A frame that does not parse gets an `error` event and the
    /// connection stays open.
    pub async fn handle_text(&mut self, text: &str) -> Step {
        if self.state == SessionState::Closed {
            return Step::Close(CloseCode::Normal);
        }
        match InboundMessage::parse(text) {
            Ok(InboundMessage {
                action: Action::Subscribe,
                trip_id,
            }) => self.subscribe(trip_id).await,
            Ok(InboundMessage {
                action: Action::Unsubscribe,
                trip_id,
            }) => self.unsubscribe(&trip_id),
            Err(e) => {
                warn!(error = %e, "malformed inbound message");
                self.reply(&OutboundMessage::error(TripId::from(""), e.to_string()));
                Step::Continue
            }
        }
    }

    /// Subscribe to `trip_id`, replacing any current subscription.
    ///
    /// A user who is neither rider nor driver of the trip closes the
    /// session with `4003`.
    pub async fn subscribe(&mut self, trip_id: TripId) -> Step {
        match &self.state {
            SessionState::Closed => return Step::Close(CloseCode::Normal),
            SessionState::Subscribed(current) if *current == trip_id => {
                self.reply(&OutboundMessage::subscribed(trip_id));
                return Step::Continue;
            }
            _ => {}
        }

        if !self.trips.can_access_trip(self.identity(), &trip_id).await {
            let err = ChannelError::Authorization { trip_id };
            counter!(WS_AUTHZ_FAILURES_TOTAL).increment(1);
            warn!(user_id = self.identity().id, error = %err, "subscription refused");
            let _ = self.close();
            return Step::Close(err.close_code().unwrap_or(CloseCode::AuthorizationFailed));
        }

        // Bind before acking: once the ack is seen, no event is missed.
        if !self.registry.bind_trip(&self.handle, Some(trip_id.clone())) {
            warn!(%trip_id, "registration lost before subscribe");
            let _ = self.close();
            return Step::Close(CloseCode::GoingAway);
        }
        self.reply(&OutboundMessage::subscribed(trip_id.clone()));
        info!(%trip_id, "subscribed");
        self.state = SessionState::Subscribed(trip_id);
        Step::Continue
    }

    /// Drop the subscription to `trip_id`.
    pub fn unsubscribe(&mut self, trip_id: &TripId) -> Step {
        match &self.state {
            SessionState::Closed => return Step::Close(CloseCode::Normal),
            SessionState::Subscribed(current) if current == trip_id => {
                let _ = self.registry.bind_trip(&self.handle, None);
                self.state = SessionState::Authenticated;
                self.reply(&OutboundMessage::unsubscribed(trip_id.clone()));
                info!(%trip_id, "unsubscribed");
            }
            _ => {
                self.reply(&OutboundMessage::error(
                    trip_id.clone(),
                    "not subscribed to this trip",
                ));
            }
        }
        Step::Continue
    }

    /// Unregister and move to `Closed`. Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;
        let _ = self.registry.unregister(&self.handle);
        true
    }

    fn reply(&self, message: &OutboundMessage) {
        match message.to_json() {
            Ok(json) => {
                if let Err(e) = self.connection.send(Arc::new(json)) {
                    debug!(error = %e, "reply dropped");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize reply"),
        }
    }
}

impl Drop for ConsumerSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
