//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadError { path: PathBuf, source: std::io::Error },

    #[error("failed to parse TOML config at {path}: {source}")]
    ParseError { path: PathBuf, source: toml::de::Error },

    #[error("failed to build configuration: {0}")]
    BuildError(String),

    #[error("invalid configuration: {0}")]
    ValidationError(String),

    #[error("replication.serverId could not be determined: {0}")]
    ServerIdError(String),

    #[error("invalid cron schedule: {0}")]
    ScheduleError(#[from] cron::error::Error),

    #[error("XDG directory error: {0}")]
    XdgError(String),
}
