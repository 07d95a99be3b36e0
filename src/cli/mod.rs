//! CLI entry point for the listing connector.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Airtable ↔ eBay listing connector
#[derive(Parser, Debug)]
#[command(
    name = "listing-connector",
    version,
    about = "OAuth token service connecting an Airtable base to an eBay seller account"
)]
pub struct Cli {
    /// Directory holding tokens.json (overrides CONNECTOR_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Show stored credentials per provider
    Status,
    /// Forget stored credentials for a provider
    Disconnect(DisconnectArgs),
}

/// Arguments for `listing-connector serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Interface to bind (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Arguments for `listing-connector disconnect`.
#[derive(Parser, Debug)]
pub struct DisconnectArgs {
    /// Provider to disconnect (airtable, ebay)
    pub provider: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
