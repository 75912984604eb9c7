//! cloudmirror CLI - Command-line interface for cloudmirror
//!
//! Provides commands for:
//! - Running a single mirroring cycle
//! - Inspecting the stored sync state
//! - Managing the access token in the system keyring
//! - Placing files into the mount directory and listing it
//! - Viewing and creating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cloudmirror_core::config::Config;

mod commands;
mod output;

use commands::{
    auth::AuthCommand, config::ConfigCommand, ls::LsCommand, pull::PullCommand,
    push::PushCommand, status::StatusCommand, sync::SyncCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "cloudmirror",
    version,
    about = "Mirror a local directory tree into cloud storage"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
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
    /// Run one mirroring cycle now
    Sync(SyncCommand),
    /// Show stored synchronization state
    Status(StatusCommand),
    /// Manage the stored access token
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Copy a file into the mount directory
    Push(PushCommand),
    /// Print a file from the mount directory
    Pull(PullCommand),
    /// List the mount directory
    Ls(LsCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
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
    let config_path = cli.config.unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(format, &config_path).await,
        Commands::Status(cmd) => cmd.execute(format, &config_path).await,
        Commands::Auth(cmd) => cmd.execute(format, &config_path).await,
        Commands::Push(cmd) => cmd.execute(format, &config_path).await,
        Commands::Pull(cmd) => cmd.execute(format, &config_path).await,
        Commands::Ls(cmd) => cmd.execute(format, &config_path).await,
        Commands::Config(cmd) => cmd.execute(format, &config_path).await,
    }
}
