//! Command-line peer for a signaling relay.

pub mod cli;
pub mod relay_client;
