//! Configuration management for Stagelock
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (STAGELOCK_* prefix, highest precedence)
//! 2. stagelock.local.toml (gitignored, local overrides)
//! 3. stagelock.toml (git-tracked, project config)
//! 4. ~/.config/stagelock/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use stagelock_types::PresenceConfig;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};

/// Main Stagelock configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagelockConfig {
    pub presence: PresenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive. `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl StagelockConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML document, without layering or validation.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings the coordinator or the log subscriber cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.presence
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("presence: {e}")))?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging: level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagelock_types::{DEFAULT_LOCK_TTL_MS, DEFAULT_PRESENCE_TTL_MS};
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = StagelockConfig::default();
        assert_eq!(config.presence.presence_ttl_ms, DEFAULT_PRESENCE_TTL_MS);
        assert_eq!(config.presence.lock_ttl_ms, DEFAULT_LOCK_TTL_MS);
        assert_eq!(config.presence.max_sessions_per_stage, None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_ttl() {
        let mut config = StagelockConfig::default();
        config.presence.lock_ttl_ms = 0;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("lock_ttl_ms"));
    }

    #[test]
    fn test_validation_rejects_tiny_session_bound() {
        let mut config = StagelockConfig::default();
        config.presence.max_sessions_per_stage = Some(1);
        assert!(config.validate().is_err());

        config.presence.max_sessions_per_stage = Some(2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_blank_level() {
        let mut config = StagelockConfig::default();
        config.logging.level = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("stagelock.toml");
        std::fs::write(
            &path,
            "[presence]\nlock_ttl_ms = 5000\n\n[logging]\nformat = \"json\"\n",
        )
        .expect("Failed to write config");

        let config = StagelockConfig::from_toml_file(&path).expect("Failed to parse config");

        assert_eq!(config.presence.lock_ttl_ms, 5000);
        assert_eq!(config.presence.presence_ttl_ms, DEFAULT_PRESENCE_TTL_MS);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_from_toml_file_reports_path() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("missing.toml");
        assert!(matches!(
            StagelockConfig::from_toml_file(&missing),
            Err(ConfigError::ReadError { .. })
        ));

        let broken = temp_dir.path().join("broken.toml");
        std::fs::write(&broken, "[logging]\nformat = \"yaml\"\n").expect("Failed to write config");
        let err = StagelockConfig::from_toml_file(&broken).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
