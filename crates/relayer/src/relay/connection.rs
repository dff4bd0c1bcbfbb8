//! A single accepted WebSocket, as seen by the registry.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::error::{RelayError, Result};

/// Identity of a connection. Assigned at accept time, never sent to clients.
pub type ConnectionId = Uuid;

/// Lifecycle state. Only ever moves forward: open -> closing -> closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque frame body. Relayed byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(Utf8Bytes),
    Binary(Bytes),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.as_str().len(),
            Self::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }
}

impl From<Payload> for Message {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(t) => Message::Text(t),
            Payload::Binary(b) => Message::Binary(b),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(Utf8Bytes::from(s))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(Utf8Bytes::from(s))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(b))
    }
}

/// One live client channel.
///
/// Writes go through a bounded queue drained by the socket's writer task, so
/// [`Connection::send`] never waits on the network.
pub struct Connection {
    id: ConnectionId,
    remote: Option<SocketAddr>,
    origin: Option<String>,
    state: AtomicU8,
    tx: mpsc::Sender<Message>,
}

impl Connection {
    pub fn new(
        remote: Option<SocketAddr>,
        origin: Option<String>,
        tx: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote,
            origin,
            state: AtomicU8::new(ConnectionState::Open as u8),
            tx,
        }
    }

    /// New open connection together with the receiving end of its outbound queue.
    pub fn channel(
        remote: Option<SocketAddr>,
        origin: Option<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::new(remote, origin, tx)), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Advance to `Closing`. Returns false if the connection was already past `Open`.
    pub fn begin_close(&self) -> bool {
        self.advance(ConnectionState::Closing) == ConnectionState::Open
    }

    pub fn mark_closed(&self) {
        self.advance(ConnectionState::Closed);
    }

    fn advance(&self, to: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.state.fetch_max(to as u8, Ordering::AcqRel))
    }

    /// Queue a frame for this client. Fails instead of waiting when the queue is full.
    pub fn send(&self, payload: Payload) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(RelayError::NotOpen(state));
        }
        self.push(payload.into())
    }

    /// Queue a close frame and move to `Closing`.
    pub fn close(&self, code: u16, reason: &str) -> Result<()> {
        self.begin_close();
        self.push(Message::Close(Some(CloseFrame {
            code,
            reason: Utf8Bytes::from(reason),
        })))
    }

    pub(crate) fn push(&self, msg: Message) -> Result<()> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::Backpressure,
            TrySendError::Closed(_) => RelayError::ChannelClosed,
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("origin", &self.origin)
            .field("state", &self.state())
            .finish()
    }
}
