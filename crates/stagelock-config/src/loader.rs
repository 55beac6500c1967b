//! Configuration loader with multi-source merging

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{Paths, StagelockConfig};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "STAGELOCK";

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    env_vars: Option<config::Map<String, String>>,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            env_vars: None,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "STAGELOCK")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Read environment overrides from `vars` instead of the process environment.
    pub fn with_env_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Load configuration from all sources with proper precedence, then validate it
    pub fn load(self) -> Result<StagelockConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = StagelockConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/stagelock/config.toml)
        if let Ok(user_config_file) = Paths::new().user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 3. Project config (stagelock.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Local config (stagelock.local.toml, gitignored)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (STAGELOCK_PRESENCE__LOCK_TTL_MS=30000)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env_vars),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let stagelock_config: StagelockConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        stagelock_config.validate()?;

        Ok(stagelock_config)
    }

    /// Load configuration or return defaults if it is missing or invalid
    pub fn load_or_default(self) -> StagelockConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogFormat;
    use std::fs;
    use tempfile::tempdir;

    fn loader(project_dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_vars(Vec::<(String, String)>::new())
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config.presence.presence_ttl_ms, 60_000);
        assert_eq!(config.presence.lock_ttl_ms, 20_000);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[presence]
presence_ttl_ms = 30000
lock_ttl_ms = 10000
max_sessions_per_stage = 64

[logging]
level = "stagelock_presence=debug"
format = "json"
"#;
        fs::write(project_dir.join("stagelock.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.presence.presence_ttl_ms, 30_000);
        assert_eq!(config.presence.lock_ttl_ms, 10_000);
        assert_eq!(config.presence.max_sessions_per_stage, Some(64));
        assert_eq!(config.logging.level, "stagelock_presence=debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("stagelock.toml"),
            "[presence]\nlock_ttl_ms = 10000\npresence_ttl_ms = 45000\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("stagelock.local.toml"),
            "[presence]\nlock_ttl_ms = 5000\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        // Local config overrides project config key by key
        assert_eq!(config.presence.lock_ttl_ms, 5_000);
        assert_eq!(config.presence.presence_ttl_ms, 45_000);
    }

    #[test]
    fn test_env_overrides_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(
            project_dir.join("stagelock.toml"),
            "[presence]\nlock_ttl_ms = 10000\n",
        )
        .expect("Failed to write project config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_vars([
                ("STAGELOCK_PRESENCE__LOCK_TTL_MS", "30000"),
                ("STAGELOCK_LOGGING__FORMAT", "json"),
                ("UNRELATED_PRESENCE__LOCK_TTL_MS", "1"),
            ])
            .load()
            .expect("Failed to load config");

        assert_eq!(config.presence.lock_ttl_ms, 30_000);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_custom_env_prefix() {
        let temp_dir = tempdir().expect("Failed to create temp dir");

        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_env_prefix("PRESENCE_HOST")
            .with_env_vars([("PRESENCE_HOST_PRESENCE__PRESENCE_TTL_MS", "90000")])
            .load()
            .expect("Failed to load config");

        assert_eq!(config.presence.presence_ttl_ms, 90_000);
    }

    #[test]
    fn test_invalid_values_fail_to_load() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(
            project_dir.join("stagelock.toml"),
            "[presence]\npresence_ttl_ms = 0\n",
        )
        .expect("Failed to write config");

        let err = loader(project_dir).load().unwrap_err();
        assert!(format!("{err:#}").contains("presence_ttl_ms"));

        let config = loader(project_dir).load_or_default();
        assert_eq!(config, StagelockConfig::default());
    }
}
