#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for paygen
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/paygen/config.toml)
//! - Environment variables
//! - CLI flags (applied by the binary)

pub mod constants;
pub mod sections;

pub use sections::{
    CacheConfig, LimitsConfig, NetworkConfig, PathConfig, SigningConfig, ToolsConfig,
};

use paygen_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("paygen").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let Ok(config_path) = Self::default_path() else {
            return Ok(Self::default());
        };

        if config_path.exists() {
            tracing::debug!(path = %config_path.display(), "loading config");
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Ok(dir) = std::env::var("PAYGEN_CACHE_DIR") {
            self.paths.cache_dir = Some(PathBuf::from(dir));
        }

        if let Ok(dir) = std::env::var("PAYGEN_WORK_ROOT") {
            self.paths.work_root = Some(PathBuf::from(dir));
        }

        if let Ok(size) = std::env::var("PAYGEN_CACHE_SIZE") {
            self.cache.capacity_bytes = parse_env("PAYGEN_CACHE_SIZE", size)?;
        }

        if let Ok(tool) = std::env::var("PAYGEN_DELTA_GENERATOR") {
            self.tools.delta_generator = tool;
        }

        if let Ok(tool) = std::env::var("PAYGEN_PAYLOAD_CHECKER") {
            self.tools.payload_checker = tool;
        }

        if let Ok(secs) = std::env::var("PAYGEN_COMMAND_TIMEOUT") {
            self.tools.command_timeout_secs = parse_env("PAYGEN_COMMAND_TIMEOUT", secs)?;
        }

        if let Ok(count) = std::env::var("PAYGEN_CONCURRENT_GENERATORS") {
            self.limits.concurrent_generators =
                parse_env("PAYGEN_CONCURRENT_GENERATORS", count)?;
        }

        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero concurrency limit or
    /// cache capacity, and `ConfigError::Invalid` when keysets and signature
    /// sizes disagree in length.
    pub fn validate(&self) -> Result<(), Error> {
        if self.limits.concurrent_generators == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.concurrent_generators".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.cache.capacity_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.capacity_bytes".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.signing.keysets.len() != self.signing.signature_sizes.len() {
            return Err(ConfigError::Invalid {
                message: format!(
                    "{} keysets but {} signature sizes",
                    self.signing.keysets.len(),
                    self.signing.signature_sizes.len()
                ),
            }
            .into());
        }
        Ok(())
    }

    /// Download cache directory (with default)
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.paths.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("paygen")
                .join(constants::CACHE_DIR_NAME)
        })
    }

    /// Parent directory for per-run working directories (with default)
    #[must_use]
    pub fn work_root(&self) -> PathBuf {
        self.paths
            .work_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Private key used for payloads signed outside the official bucket
    #[must_use]
    pub fn testing_private_key(&self) -> PathBuf {
        self.paths.testing_private_key.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("paygen")
                .join(constants::TESTING_KEY_RELATIVE)
        })
    }

    /// External tool timeout; `None` when disabled.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        match self.tools.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> Result<T, Error> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()
    })
}
