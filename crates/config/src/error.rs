//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write configuration file
    #[error("Failed to write config file at {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize configuration
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid timeout configuration
    #[error("Invalid timeout: {name} must be positive, got {value}ms")]
    InvalidTimeout { name: &'static str, value: u64 },

    /// Minimum block interval does not leave room for round 0
    #[error("Invalid interval: min_block_interval_ms ({interval}) must be below round_timeout_ms ({timeout})")]
    InvalidInterval { interval: u64, timeout: u64 },

    /// Queue capacity of zero
    #[error("Invalid capacity: {name} must be at least 1")]
    InvalidCapacity { name: &'static str },

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Invalid log format
    #[error("Invalid log format: {0}. Valid values: text, json, compact")]
    InvalidLogFormat(String),

    /// Devnet committee without validators
    #[error("Invalid committee size: must be at least 1, got {0}")]
    InvalidCommitteeSize(usize),

    /// Shard count does not fit a shard index
    #[error("Too many shards: at most 255, got {0}")]
    TooManyShards(u16),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
