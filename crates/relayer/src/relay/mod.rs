//! Connection registry and broadcast relay.
//!
//! Every accepted WebSocket becomes a [`Connection`] in the process-wide
//! [`Registry`]. Frames from one connection are fanned out unmodified to all
//! other open connections; close and error events remove the sender.

mod connection;
mod registry;

use std::net::SocketAddr;

pub use connection::{Connection, ConnectionId, ConnectionState, Payload};
pub use registry::{BroadcastReport, Membership, Registry};

/// Close code sent to clients when the server drains on shutdown ("going away").
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Transport event for one connection, fed to [`Registry::dispatch`].
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Message(Payload),
    Close { code: Option<u16>, reason: String },
    Error(String),
}

/// Observability notifications. Not part of the relay contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected {
        id: ConnectionId,
        remote: Option<SocketAddr>,
        live: usize,
    },
    Disconnected {
        id: ConnectionId,
        live: usize,
    },
    Errored {
        id: ConnectionId,
        error: String,
    },
}
