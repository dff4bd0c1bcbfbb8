//! Relay error types.

use thiserror::Error;

use crate::relay::ConnectionState;

/// Failure to hand a frame to one connection's outbound queue.
///
/// These never escape a broadcast: the fan-out logs them and moves on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Connection is closing or closed.
    #[error("connection is {0}")]
    NotOpen(ConnectionState),

    /// Outbound queue is full (slow peer).
    #[error("outbound queue full")]
    Backpressure,

    /// Writer task has gone away.
    #[error("outbound channel closed")]
    ChannelClosed,
}

/// Configuration error, fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
