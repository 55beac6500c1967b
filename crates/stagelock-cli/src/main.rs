//! Stagelock CLI.
//!
//! Session presence and optimistic write locking for collaborative stages.
//!
//! # Quick Start
//!
//! ```bash
//! # Show the effective configuration for a project
//! stagelock config show --project ./my-app
//!
//! # Drive a coordinator from a scripted session timeline
//! stagelock replay ./scenario.json --start-ms 1700000000000
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use stagelock_config::{ConfigLoader, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Stagelock - who is here, who may write, and who is behind.
#[derive(Parser)]
#[command(name = "stagelock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory holding stagelock.toml.
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Replay a JSON script of presence operations against a manual clock.
    Replay {
        /// Path to the script (a JSON array of steps), or "-" for stdin.
        script: PathBuf,

        /// Clock reading, in milliseconds since the Unix epoch, before the first step.
        #[arg(long, default_value_t = 0)]
        start_ms: u64,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration after all sources are merged.
    Show {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Check that the merged configuration loads and validates.
    Validate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Toml,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Invalid config still gets a subscriber; the command itself reports the error.
    let logging = ConfigLoader::new()
        .with_project_dir(&cli.project)
        .load_or_default()
        .logging;
    init_tracing(&logging);

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { format } => commands::config::show(&cli.project, format),
            ConfigCommands::Validate => commands::config::validate(&cli.project),
        },
        Commands::Replay { script, start_ms } => {
            commands::replay::run(&cli.project, &script, start_ms)
        }
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays machine-readable.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
