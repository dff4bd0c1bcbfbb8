//! Shared wire types for the signaling relay and its probe.

mod models;

// Explicit re-exports (avoids rust-analyzer issues with `pub use models::*`)
pub use models::ws_types;
pub use models::{
    iso8601_now, ChatMessage, ErrorBody, HealthResponse, ServiceInfo, SignalEnvelope,
    SystemMessage, WELCOME_TEXT,
};
