//! Configuration management commands.

use std::path::Path;

use anyhow::{Context, Result};
use stagelock_config::{PROJECT_CONFIG_FILE, Paths, StagelockConfig};

use crate::OutputFormat;

/// Show the merged configuration.
pub fn show(project: &Path, format: OutputFormat) -> Result<()> {
    let config = StagelockConfig::load_from_dir(project).context("Failed to load configuration")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Toml => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        OutputFormat::Text => {
            println!("Stagelock Configuration");
            println!("=======================\n");

            println!("Sources:");
            print_source("User", Paths::new().user_config_file().ok().as_deref());
            print_source("Project", Some(&Paths::project_config_file(project)));
            print_source("Local", Some(&Paths::local_config_file(project)));
            println!();

            println!("Presence:");
            println!("  Presence TTL: {} ms", config.presence.presence_ttl_ms);
            println!("  Lock TTL: {} ms", config.presence.lock_ttl_ms);
            println!(
                "  Max sessions per stage: {}",
                config
                    .presence
                    .max_sessions_per_stage
                    .map_or("unbounded".to_string(), |max| max.to_string())
            );
            println!();

            println!("Logging:");
            println!("  Level: {}", config.logging.level);
            println!("  Format: {:?}", config.logging.format);
        }
    }

    Ok(())
}

/// Validate configuration files.
pub fn validate(project: &Path) -> Result<()> {
    println!("Validating configuration in {}...", project.display());
    if !Paths::is_initialized(project) {
        println!("  No {PROJECT_CONFIG_FILE} found, checking defaults and overrides only");
    }

    match StagelockConfig::load_from_dir(project) {
        Ok(_) => {
            println!("✓ Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration validation failed:");
            println!("  {e:#}");
            Err(e)
        }
    }
}

fn print_source(label: &str, path: Option<&Path>) {
    match path {
        Some(path) if path.exists() => println!("  {label}: {}", path.display()),
        Some(path) => println!("  {label}: {} (not found)", path.display()),
        None => println!("  {label}: unavailable"),
    }
}
