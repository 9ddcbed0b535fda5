//! Cluster monitor CLI
//!
//! A command-line tool for inspecting the feeds of a running monitor
//! agent, steering the shared time window and checking agent health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::{feeds, health, window};

/// Cluster monitor CLI
#[derive(Parser)]
#[command(name = "cmon")]
#[command(author, version, about = "CLI for the Cluster Monitor agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (default http://localhost:8080, or api_url from the config file)
    #[arg(long, env = "CMON_API_URL")]
    pub api_url: Option<String>,

    /// Output format [default: table, or default_format from the config file]
    #[arg(long, short, value_enum)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect feeds
    #[command(subcommand)]
    Feeds(FeedsCommands),

    /// Show or change the shared time window
    #[command(subcommand)]
    Window(WindowCommands),

    /// Show agent health
    Health,
}

#[derive(Subcommand)]
pub enum FeedsCommands {
    /// List live feeds
    List,

    /// Show one feed with its recent samples
    Show {
        /// Feed ID as shown by `feeds list`
        id: String,
    },
}

#[derive(Subcommand)]
pub enum WindowCommands {
    /// Show the stored time window
    Get,

    /// Pin charts to a time window
    Set {
        /// Window start (RFC 3339, e.g. 2024-05-01T10:00:00Z)
        #[arg(long)]
        start: DateTime<Utc>,

        /// Window end (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,
    },

    /// Clear the time window so charts follow live data
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let format = config.format(cli.format)?;
    let client = client::ApiClient::new(&config.api_url(cli.api_url))?;

    match cli.command {
        Commands::Feeds(feeds_cmd) => match feeds_cmd {
            FeedsCommands::List => feeds::list_feeds(&client, format).await?,
            FeedsCommands::Show { id } => feeds::show_feed(&client, &id, format).await?,
        },
        Commands::Window(window_cmd) => match window_cmd {
            WindowCommands::Get => window::get_window(&client, format).await?,
            WindowCommands::Set { start, end } => {
                window::set_window(&client, start, end, format).await?
            }
            WindowCommands::Clear => window::clear_window(&client, format).await?,
        },
        Commands::Health => health::show_health(&client, format).await?,
    }

    Ok(())
}
