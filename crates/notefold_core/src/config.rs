//! Runtime configuration.
//!
//! # Responsibility
//! - Load `CoreConfig` from an optional TOML file plus `NOTEFOLD_` env vars.
//! - Fall back to defaults when no file exists.
//!
//! Env keys use `__` between nesting levels, e.g. `NOTEFOLD_DATABASE__PATH`.

use crate::logging::{default_log_level, normalize_level};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_DB_FILE_NAME: &str = "notefold.sqlite3";
const ENV_PREFIX: &str = "NOTEFOLD";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_FILE_NAME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level_string")]
    pub level: String,
    /// Absolute directory for rolling log files; stderr when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level_string(),
            dir: None,
        }
    }
}

/// One token accepted by the static identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityConfig {
    pub token: String,
    pub uid: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub identities: Vec<IdentityConfig>,
}

#[derive(Debug)]
pub enum ConfigLoadError {
    Source(config::ConfigError),
    InvalidLogLevel(String),
}

impl Display for ConfigLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(err) => write!(f, "failed to load config: {err}"),
            Self::InvalidLogLevel(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigLoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(err) => Some(err),
            Self::InvalidLogLevel(_) => None,
        }
    }
}

impl From<config::ConfigError> for ConfigLoadError {
    fn from(value: config::ConfigError) -> Self {
        Self::Source(value)
    }
}

/// Loads configuration; a missing file is not an error.
pub fn load_config(path: Option<&Path>) -> Result<CoreConfig, ConfigLoadError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
    }
    let settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    let config: CoreConfig = settings.try_deserialize()?;
    normalize_level(&config.logging.level).map_err(ConfigLoadError::InvalidLogLevel)?;
    Ok(config)
}

fn default_level_string() -> String {
    default_log_level().to_string()
}
