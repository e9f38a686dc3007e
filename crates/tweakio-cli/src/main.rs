//! # tweakio
//!
//! Operator CLI over the tweakio libraries:
//! - **profiles**: create, inspect, activate, back up and delete
//!   per-platform profiles
//! - **keys**: set up a profile's password-derived message key
//! - **messages**: import captured messages into a profile's store and read
//!   them back

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{Context, KeyCommand, MessagesCommand, ProfileCommand};
use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "tweakio", version)]
#[command(about = "Manage tweakio profiles, keys and captured messages", long_about = None)]
struct Cli {
    /// Password for key derivation (falls back to TWEAKIO_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Data root overriding the OS default (falls back to TWEAKIO_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, inspect and manage profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Set up and export a profile's message key
    #[command(subcommand)]
    Key(KeyCommand),

    /// Import and read captured messages
    #[command(subcommand)]
    Messages(MessagesCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,tweakio_store=debug,tweakio_profiles=debug")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CliConfig::from_env().with_overrides(cli.data_dir, cli.password);
    debug!(?config, "loaded configuration");

    let ctx = Context::new(config)?;
    match cli.command {
        Commands::Profile(cmd) => commands::profile::run(&ctx, cmd),
        Commands::Key(cmd) => commands::key::run(&ctx, cmd),
        Commands::Messages(cmd) => commands::messages::run(&ctx, cmd).await,
    }
}
