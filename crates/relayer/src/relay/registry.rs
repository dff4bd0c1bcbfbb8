//! Live connection set and fan-out.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::extract::ws::{Message, Utf8Bytes};
use shared::SystemMessage;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{
    Connection, ConnectionEvent, ConnectionId, LifecycleEvent, Payload, CLOSE_GOING_AWAY,
};

const LIFECYCLE_CHANNEL_CAPACITY: usize = 256;

/// Outcome of one [`Registry::broadcast`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Queued on a peer's outbound channel.
    pub delivered: usize,
    /// Peer not open (mid-close); left in the set.
    pub skipped: usize,
    /// Peer's queue was full or gone; left in the set.
    pub failed: usize,
}

/// Process-wide set of open connections.
///
/// Registration, removal and fan-out all take the same lock, so a broadcast
/// never observes a half-removed member. Sends inside the fan-out are
/// `try_send` and never wait while the lock is held.
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl Registry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        Self {
            connections: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Lifecycle notifications (connect, disconnect, error).
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.read().contains_key(id)
    }

    /// Add a freshly accepted connection and queue its welcome message.
    ///
    /// The welcome is queued before the write lock is released, so it is
    /// always the first frame the client receives. Registering the same
    /// connection twice is a no-op and returns false.
    pub fn register(&self, conn: Arc<Connection>) -> bool {
        let id = conn.id();
        let live = {
            let mut connections = self.write();
            if connections.contains_key(&id) {
                warn!("Connection {} already registered", id);
                return false;
            }
            connections.insert(id, conn.clone());

            let welcome = SystemMessage::welcome().to_json();
            if let Err(e) = conn.push(Message::Text(Utf8Bytes::from(welcome))) {
                warn!("Failed to queue welcome for {}: {}", id, e);
            }
            connections.len()
        };

        let remote = conn
            .remote()
            .map_or_else(|| "unknown".to_string(), |a| a.to_string());
        info!(
            "Client {} connected from {} (origin {}), {} live",
            id,
            remote,
            conn.origin().unwrap_or("unknown"),
            live
        );
        self.notify(LifecycleEvent::Connected {
            id,
            remote: conn.remote(),
            live,
        });
        true
    }

    /// Remove a connection. Removing an absent connection is a no-op and returns false.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let (removed, live) = {
            let mut connections = self.write();
            let removed = connections.remove(id).is_some();
            (removed, connections.len())
        };
        if removed {
            info!("Client {} disconnected, {} live", id, live);
            self.notify(LifecycleEvent::Disconnected { id: *id, live });
        }
        removed
    }

    /// Send `payload` to every open member except `source`.
    ///
    /// A failure to one peer is logged and counted, never propagated, and does
    /// not remove that peer: its own close or error event does that.
    pub fn broadcast(&self, source: &ConnectionId, payload: &Payload) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let connections = self.read();
        for (id, peer) in connections.iter() {
            if id == source {
                continue;
            }
            if !peer.is_open() {
                report.skipped += 1;
                continue;
            }
            match peer.send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to relay {} bytes from {} to {}: {}",
                        payload.len(),
                        source,
                        id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        drop(connections);

        debug!(
            "Relayed {} frame ({} bytes) from {}: {} delivered, {} skipped, {} failed",
            payload.kind(),
            payload.len(),
            source,
            report.delivered,
            report.skipped,
            report.failed
        );
        report
    }

    /// Close from the peer. Same registry effect as an error.
    pub fn on_close(&self, conn: &Connection, code: Option<u16>, reason: &str) -> bool {
        debug!(
            "Client {} sent close (code {:?}, reason {:?})",
            conn.id(),
            code,
            reason
        );
        conn.begin_close();
        self.unregister(&conn.id())
    }

    /// Transport fault. The error text is for logs and notifications only.
    pub fn on_transport_error(&self, conn: &Connection, error: &str) -> bool {
        warn!("WebSocket error for {}: {}", conn.id(), error);
        self.notify(LifecycleEvent::Errored {
            id: conn.id(),
            error: error.to_string(),
        });
        conn.begin_close();
        self.unregister(&conn.id())
    }

    /// Single entry point for a connection's transport events.
    ///
    /// Returns `Break` once the connection has left the set and its reader should stop.
    pub fn dispatch(&self, conn: &Connection, event: ConnectionEvent) -> ControlFlow<()> {
        match event {
            ConnectionEvent::Message(payload) => {
                self.broadcast(&conn.id(), &payload);
                ControlFlow::Continue(())
            }
            ConnectionEvent::Close { code, reason } => {
                self.on_close(conn, code, &reason);
                ControlFlow::Break(())
            }
            ConnectionEvent::Error(error) => {
                self.on_transport_error(conn, &error);
                ControlFlow::Break(())
            }
        }
    }

    /// Ask every member to close (server shutdown). Members leave the set as
    /// their own close events arrive. Returns how many were asked.
    pub fn close_all(&self) -> usize {
        let connections = self.read();
        for (id, conn) in connections.iter() {
            if let Err(e) = conn.close(CLOSE_GOING_AWAY, "server shutting down") {
                warn!("Failed to queue close for {}: {}", id, e);
            }
        }
        connections.len()
    }

    fn notify(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry membership tied to a connection handler's scope.
///
/// Dropping it, including during a panic unwind, moves the connection to
/// closed and removes it from the set, so a faulted handler cannot leave a
/// stale member behind.
pub struct Membership {
    relay: Arc<Registry>,
    conn: Arc<Connection>,
}

impl Membership {
    /// Register `conn` (queuing its welcome) and return the guard.
    pub fn join(relay: Arc<Registry>, conn: Arc<Connection>) -> Self {
        relay.register(conn.clone());
        Self { relay, conn }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.conn.begin_close();
        self.relay.unregister(&self.conn.id());
        self.conn.mark_closed();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
