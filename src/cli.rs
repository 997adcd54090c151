//! Command-line interface definitions using clap

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// clicktrail - affiliate click tracking and postback delivery
#[derive(Parser)]
#[command(name = "clicktrail")]
#[command(version)]
#[command(about = "Affiliate click tracking and postback delivery service", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Manage postback profiles
    Profiles {
        #[command(subcommand)]
        action: ProfileCommands,
    },

    /// Inspect and retry postback deliveries
    Deliveries {
        #[command(subcommand)]
        action: DeliveryCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (default: config.example.toml)
        output_path: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// List all postback profiles
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import postback profiles from a JSON array file
    Import {
        /// Input file path
        file_path: String,
    },
}

#[derive(Subcommand)]
pub enum DeliveryCommands {
    /// List delivery log entries (newest first)
    List {
        #[arg(long)]
        profile_id: Option<i64>,

        /// success, http_error, transport_error or render_error
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        event_id: Option<String>,

        #[arg(long)]
        click_id: Option<String>,

        #[arg(long)]
        chain_id: Option<String>,

        /// RFC3339 lower bound on created_at
        #[arg(long)]
        from: Option<String>,

        /// RFC3339 upper bound on created_at
        #[arg(long)]
        to: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: u64,

        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-deliver a logged delivery as a new chain (picked up by the running server)
    Retry {
        /// Delivery id
        id: i64,
    },
}
