//! CLI module for the updater
//!
//! Without a subcommand the updater window opens; every subcommand runs
//! headless against the same coordinator.

mod commands;
mod output;

use clap::{Parser, Subcommand};

use crate::context::RuntimeContext;
use crate::gateway::GatewayClient;
use crate::version::VersionInfo;

pub use output::{print_error, OutputFormat};

/// App Updater - check, download and install application updates
#[derive(Parser, Debug)]
#[command(name = "app-updater")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[command(flatten)]
    pub output: OutputOptions,

    /// Runtime context (development or production); detected when omitted
    #[arg(long, global = true)]
    pub context: Option<RuntimeContext>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output formatting options
#[derive(Parser, Debug, Clone)]
pub struct OutputOptions {
    /// Output in JSON format (for machine parsing)
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl OutputOptions {
    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the release feed for a newer version
    Check,

    /// Check, then download the newer version
    Download,

    /// Check, download and run the installer (exits on success)
    Install,

    /// Show version information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },
}

impl Commands {
    /// Whether the command talks to the update coordinator
    pub fn needs_coordinator(&self) -> bool {
        !matches!(self, Commands::Config { .. })
    }
}

/// Run a subcommand
pub async fn run(
    command: Commands,
    output: &OutputOptions,
    context: RuntimeContext,
    versions: &VersionInfo,
    client: Option<GatewayClient>,
) -> anyhow::Result<()> {
    let format = output.format();
    let quiet = output.quiet;

    let gateway = || {
        client
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Update gateway is not running"))
    };

    match command {
        Commands::Check => commands::update::check(gateway()?, format, quiet).await,
        Commands::Download => commands::update::download(gateway()?, format, quiet).await,
        Commands::Install => commands::update::install(gateway()?, format, quiet).await,
        Commands::Version => commands::update::version(gateway()?, context, versions, format).await,
        Commands::Config { command } => commands::config::run(command, format, quiet).await,
    }
}
