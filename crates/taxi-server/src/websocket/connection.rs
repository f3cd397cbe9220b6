//! Per-connection state and the bounded outbound queue.
//!
//! Producers (the dispatcher, the consumer's own acknowledgements) push
//! serialized frames with [`ClientConnection::send`]; the connection's writer
//! task drains them with [`ClientConnection::recv`]. The queue never blocks a
//! producer: when full, the oldest frame is discarded.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use taxi_core::{CloseCode, ConnectionId, DeliveryError, Identity};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Result of a successful enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// The frame was queued.
    Queued,
    /// The frame was queued after evicting the oldest pending frame.
    DroppedOldest,
}

#[derive(Default)]
struct Outbound {
    frames: VecDeque<Arc<String>>,
    close: Option<CloseCode>,
}

/// An open, authenticated WebSocket connection.
pub struct ClientConnection {
    id: ConnectionId,
    identity: Identity,
    outbound: Mutex<Outbound>,
    ready: Notify,
    capacity: usize,
    cancel: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    pub is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl ClientConnection {
    /// Create a connection whose queue holds at most `capacity` frames.
    ///
    /// `cancel` is fired when the connection closes; pass a child of the
    /// server's shutdown token so shutdown reaches every connection.
    pub fn new(
        id: ConnectionId,
        identity: Identity,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity,
            outbound: Mutex::new(Outbound::default()),
            ready: Notify::new(),
            capacity: capacity.max(1),
            cancel,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// The authenticated user.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Queue a frame for the client.
    ///
    /// Fails only if the connection is closed. A full queue discards its
    /// oldest frame and still accepts this one.
    pub fn send(&self, frame: Arc<String>) -> Result<Enqueued, DeliveryError> {
        let outcome = {
            let mut outbound = self.outbound.lock();
            if outbound.close.is_some() {
                return Err(DeliveryError::Closed(self.id.clone()));
            }
            let outcome = if outbound.frames.len() >= self.capacity {
                let _ = outbound.frames.pop_front();
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Enqueued::DroppedOldest
            } else {
                Enqueued::Queued
            };
            outbound.frames.push_back(frame);
            outcome
        };
        self.ready.notify_one();
        Ok(outcome)
    }

    /// Next frame to write.
    ///
    /// After [`close`](Self::close) the frames already queued are still
    /// returned; `None` means the queue is closed and drained.
    pub async fn recv(&self) -> Option<Arc<String>> {
        loop {
            let notified = self.ready.notified();
            {
                let mut outbound = self.outbound.lock();
                if let Some(frame) = outbound.frames.pop_front() {
                    return Some(frame);
                }
                if outbound.close.is_some() {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the connection with `code`.
    ///
    /// Only the first call sets the code. Later sends fail with
    /// [`DeliveryError::Closed`] and the cancellation token fires.
    pub fn close(&self, code: CloseCode) -> bool {
        let first = {
            let mut outbound = self.outbound.lock();
            if outbound.close.is_some() {
                false
            } else {
                outbound.close = Some(code);
                true
            }
        };
        self.ready.notify_one();
        self.cancel.cancel();
        first
    }

    /// Close code, once closed.
    pub fn close_code(&self) -> Option<CloseCode> {
        self.outbound.lock().close
    }

    /// Whether the connection still accepts frames.
    pub fn is_open(&self) -> bool {
        self.outbound.lock().close.is_none()
    }

    /// Frames waiting to be written.
    pub fn pending(&self) -> usize {
        self.outbound.lock().frames.len()
    }

    /// Token cancelled when the connection closes or the server shuts down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Total frames discarded because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record client activity (any inbound frame, including pongs).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the client was active since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last client activity.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
