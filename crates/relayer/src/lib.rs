//! WebRTC signaling relay: WebSocket connection registry and broadcast fan-out.

pub mod api;
pub mod config;
pub mod error;
pub mod relay;
