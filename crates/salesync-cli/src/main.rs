//! Salesync CLI - Operator commands for the mirror synchronization engine
//!
//! Provides commands for:
//! - Viewing queue and mirror status
//! - Listing and retrying failed sync requests
//! - Enqueueing signals and reconciling a triple by hand
//! - Draining the queue without a daemon
//! - Inspecting mirror records and the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, drain::DrainCommand, enqueue::EnqueueCommand, failed::FailedCommand,
    mirror::MirrorCommand, reconcile::ReconcileCommand, retry::RetryCommand,
    status::StatusCommand, CliContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "salesync",
    version,
    about = "Keep sales channels in sync with the local catalogue"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show sync request and mirror record counts
    Status(StatusCommand),
    /// List failed sync requests
    Failed(FailedCommand),
    /// Re-queue failed sync requests
    Retry(RetryCommand),
    /// Emit a sync signal for an (entity, channel, view) triple
    Enqueue(EnqueueCommand),
    /// Reconcile one triple immediately
    Reconcile(ReconcileCommand),
    /// Process every due request once and exit
    Drain(DrainCommand),
    /// Inspect mirror records or link existing remote products
    #[command(subcommand)]
    Mirror(MirrorCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let ctx = CliContext::load(cli.config)?;

    match cli.command {
        Commands::Status(cmd) => cmd.execute(&ctx, format).await,
        Commands::Failed(cmd) => cmd.execute(&ctx, format).await,
        Commands::Retry(cmd) => cmd.execute(&ctx, format).await,
        Commands::Enqueue(cmd) => cmd.execute(&ctx, format).await,
        Commands::Reconcile(cmd) => cmd.execute(&ctx, format).await,
        Commands::Drain(cmd) => cmd.execute(&ctx, format).await,
        Commands::Mirror(cmd) => cmd.execute(&ctx, format).await,
        Commands::Config(cmd) => cmd.execute(&ctx, format).await,
    }
}
