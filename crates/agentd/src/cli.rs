//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "calagent", about = "Calendar negotiation agent", version)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "calagent.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Negotiate a meeting with a peer agent.
    Book {
        /// Peer discovery base URL (agent card is fetched from it).
        endpoint: String,
        /// Peer agent identifier.
        target: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        time: Option<String>,
        #[arg(long, default_value = "30m")]
        duration: String,
        #[arg(long)]
        title: Option<String>,
        /// Print progress events while negotiating.
        #[arg(long)]
        verbose: bool,
    },

    /// List available slots in a window.
    Slots {
        /// ISO instant, window start.
        start: String,
        /// ISO instant, window end.
        end: String,
        #[arg(long, default_value = "30m")]
        duration: String,
    },

    /// List calendar events.
    Events {
        #[arg(long)]
        status: Option<String>,
    },

    /// Propose an event directly on the local calendar.
    Propose {
        /// ISO instant.
        start: String,
        duration: String,
        partner: String,
        #[arg(long)]
        title: Option<String>,
    },

    /// Interactive natural-language REPL against the local calendar.
    Chat {
        /// Default partner id for booking requests.
        #[arg(long)]
        partner: Option<String>,
    },

    /// Show or update the stored booking preferences.
    Prefs {
        #[arg(long)]
        start_hour: Option<u32>,
        #[arg(long)]
        end_hour: Option<u32>,
        /// Buffer between meetings, in minutes.
        #[arg(long)]
        buffer: Option<u32>,
        #[arg(long)]
        allow_back_to_back: Option<bool>,
        /// Add a partner id to the blocked list.
        #[arg(long)]
        block: Option<String>,
        /// Remove a partner id from the blocked list.
        #[arg(long)]
        unblock: Option<String>,
        /// Free-form instructions carried into agent prompts.
        #[arg(long)]
        instructions: Option<String>,
    },

    /// Validate and print the effective configuration.
    Config,
}
