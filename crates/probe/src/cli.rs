//! CLI argument parsing.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "signal-probe")]
#[command(about = "Exercise a running signaling relay from the command line")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Query the relay's health endpoint
    Health {
        /// Base HTTP URL of the relay [env: RELAY_URL]
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },

    /// Connect and print every frame relayed to this peer
    Listen {
        /// WebSocket URL of the relay [env: RELAY_WS_URL]
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },

    /// Connect, send one chat message to all other peers, then leave
    Send {
        /// Message text
        #[arg(value_name = "MESSAGE")]
        message: String,

        /// WebSocket URL of the relay [env: RELAY_WS_URL]
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Keep printing relayed frames for this many seconds before closing
        #[arg(long, default_value_t = 0)]
        wait_secs: u64,
    },
}
