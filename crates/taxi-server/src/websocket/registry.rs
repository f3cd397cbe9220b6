//! Registry of open, authenticated connections.
//!
//! Mutations are serialized by a write lock and publish a fresh immutable
//! [`Snapshot`]; readers clone the current `Arc<Snapshot>` and iterate it
//! without holding any lock. A reader therefore sees either the state before
//! a mutation or the state after it, never a mix.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use taxi_core::{ChannelError, ConnectionId, TripId};
use tracing::{debug, warn};

use super::connection::ClientConnection;

/// Proof of registration returned by [`ConnectionRegistry::register`].
///
/// Carries a generation so a handle from a replaced registration can never
/// remove or rebind its successor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationHandle {
    id: ConnectionId,
    generation: u64,
}

impl RegistrationHandle {
    /// Registered connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

#[derive(Clone)]
struct Entry {
    connection: Arc<ClientConnection>,
    trip: Option<TripId>,
    generation: u64,
}

/// Immutable view of the registry at one point in time.
#[derive(Clone, Default)]
pub struct Snapshot {
    /// Entries in registration order.
    entries: Vec<Entry>,
    /// Positions in `entries` per subscribed trip, ascending.
    by_trip: HashMap<TripId, Vec<usize>>,
}

impl Snapshot {
    fn rebuild_index(&mut self) {
        self.by_trip.clear();
        for (pos, entry) in self.entries.iter().enumerate() {
            if let Some(trip) = &entry.trip {
                self.by_trip.entry(trip.clone()).or_default().push(pos);
            }
        }
    }

    fn position(&self, handle: &RegistrationHandle) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.connection.id() == &handle.id && e.generation == handle.generation)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of connections subscribed to some trip.
    pub fn subscription_count(&self) -> usize {
        self.by_trip.values().map(Vec::len).sum()
    }
}

/// Connections subscribed to one trip, as of the snapshot it was taken from.
///
/// Lazy and finite. [`restart`](Self::restart) rewinds it over the same
/// snapshot, so repeated passes see the same connections in the same order.
#[derive(Clone)]
pub struct TripConnections {
    snapshot: Arc<Snapshot>,
    trip: TripId,
    pos: usize,
}

impl TripConnections {
    /// Rewind to the first connection.
    pub fn restart(&mut self) {
        self.pos = 0;
    }

    /// Trip being iterated.
    pub fn trip_id(&self) -> &TripId {
        &self.trip
    }

    fn positions(&self) -> &[usize] {
        self.snapshot
            .by_trip
            .get(&self.trip)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl Iterator for TripConnections {
    type Item = Arc<ClientConnection>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = *self.positions().get(self.pos)?;
        self.pos += 1;
        self.snapshot
            .entries
            .get(idx)
            .map(|e| Arc::clone(&e.connection))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.positions().len().saturating_sub(self.pos);
        (left, Some(left))
    }
}

/// Tracks live connections and the trip each is subscribed to.
pub struct ConnectionRegistry {
    current: RwLock<Arc<Snapshot>>,
    next_generation: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::default())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.read())
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Snapshot) -> R) -> R {
        let mut current = self.current.write();
        let mut next = Snapshot::clone(&**current);
        let result = f(&mut next);
        *current = Arc::new(next);
        result
    }

    /// Register a connection, not yet subscribed to any trip.
    ///
    /// Registering an id that is already present replaces the prior entry
    /// (which moves to the end of the registration order) and logs a
    /// conflict.
    pub fn register(&self, connection: Arc<ClientConnection>) -> RegistrationHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let id = connection.id().clone();
        let replaced = self.mutate(|snap| {
            let before = snap.entries.len();
            snap.entries.retain(|e| e.connection.id() != &id);
            let replaced = snap.entries.len() != before;
            snap.entries.push(Entry {
                connection,
                trip: None,
                generation,
            });
            snap.rebuild_index();
            replaced
        });
        if replaced {
            let conflict = ChannelError::RegistryConflict(id.clone());
            warn!(conn_id = %id, error = %conflict, "registry conflict, prior entry replaced");
        } else {
            debug!(conn_id = %id, "connection registered");
        }
        RegistrationHandle { id, generation }
    }

    /// Point a registration at `trip`, or at no trip with `None`.
    ///
    /// Returns `false` if the handle is no longer registered.
    pub fn bind_trip(&self, handle: &RegistrationHandle, trip: Option<TripId>) -> bool {
        self.mutate(|snap| {
            let Some(pos) = snap.position(handle) else {
                return false;
            };
            snap.entries[pos].trip = trip;
            snap.rebuild_index();
            true
        })
    }

    /// Remove a registration. Idempotent: later calls return `false`.
    pub fn unregister(&self, handle: &RegistrationHandle) -> bool {
        let removed = self.mutate(|snap| {
            let Some(pos) = snap.position(handle) else {
                return false;
            };
            let _ = snap.entries.remove(pos);
            snap.rebuild_index();
            true
        });
        if removed {
            debug!(conn_id = %handle.id, "connection unregistered");
        }
        removed
    }

    /// Connections currently subscribed to `trip_id`, in registration order.
    pub fn find_by_trip(&self, trip_id: &TripId) -> TripConnections {
        TripConnections {
            snapshot: self.snapshot(),
            trip: trip_id.clone(),
            pos: 0,
        }
    }

    /// Trip the connection is subscribed to.
    pub fn trip_of(&self, id: &ConnectionId) -> Option<TripId> {
        self.snapshot()
            .entries
            .iter()
            .find(|e| e.connection.id() == id)
            .and_then(|e| e.trip.clone())
    }

    /// Look up a connection by id.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.snapshot()
            .entries
            .iter()
            .find(|e| e.connection.id() == id)
            .map(|e| Arc::clone(&e.connection))
    }

    /// Every registered connection, in registration order.
    pub fn connections(&self) -> Vec<Arc<ClientConnection>> {
        self.snapshot()
            .entries
            .iter()
            .map(|e| Arc::clone(&e.connection))
            .collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Number of connections subscribed to a trip.
    pub fn subscription_count(&self) -> usize {
        self.snapshot().subscription_count()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
