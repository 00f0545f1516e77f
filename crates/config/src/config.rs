//! Main configuration module for Meridian
//!
//! All node settings are defined in one `meridian.toml` file; every section
//! falls back to its defaults when omitted.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration struct containing all Meridian settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Round state machine parameters
    pub consensus: ConsensusConfig,

    /// Engine (orchestrator) parameters
    pub engine: EngineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Validator key files
    pub validator: ValidatorConfig,

    /// In-memory devnet shape
    pub devnet: DevnetConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use meridian_config::Config;
    /// use std::path::Path;
    ///
    /// let config = Config::load(Path::new("meridian.toml"))?;
    /// ```
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("Loading configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = Self::from_str(&content)?;

        info!(
            round_timeout_ms = config.consensus.round_timeout_ms,
            multiview_epoch = config.engine.multiview_epoch,
            keys = config.validator.key_files.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Load configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        debug!("Configuration parsed successfully, validating...");
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.consensus.validate()?;
        self.engine.validate()?;
        self.logging.validate()?;
        self.devnet.validate()?;

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

// =============================================================================
// Consensus Configuration
// =============================================================================

/// Round state machine timing and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Length of one round; `round = floor(time_since_last_block / round_timeout)`
    pub round_timeout_ms: u64,

    /// Minimum time between two blocks of a chain
    pub min_block_interval_ms: u64,

    /// Period of the state machine's re-evaluation tick
    pub tick_interval_ms: u64,

    /// Length of one timeslot for the multi-view finality rule
    pub timeslot_ms: u64,

    /// Capacity of each chain's message inbox
    pub inbox_capacity: usize,

    /// Enable equivocation checks on multi-view chains
    pub byzantine_detector: bool,

    /// How long a detected equivocator stays blacklisted
    pub blacklist_ttl_secs: u64,
}

impl ConsensusConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("round_timeout_ms", self.round_timeout_ms),
            ("tick_interval_ms", self.tick_interval_ms),
            ("timeslot_ms", self.timeslot_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidTimeout { name, value });
            }
        }

        if self.min_block_interval_ms >= self.round_timeout_ms {
            return Err(ConfigError::InvalidInterval {
                interval: self.min_block_interval_ms,
                timeout: self.round_timeout_ms,
            });
        }

        if self.inbox_capacity == 0 {
            return Err(ConfigError::InvalidCapacity {
                name: "inbox_capacity",
            });
        }

        Ok(())
    }

    /// Round timeout as a duration.
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    /// Minimum block interval as a duration.
    pub fn min_block_interval(&self) -> Duration {
        Duration::from_millis(self.min_block_interval_ms)
    }

    /// Tick interval as a duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Timeslot length as a duration.
    pub fn timeslot(&self) -> Duration {
        Duration::from_millis(self.timeslot_ms)
    }

    /// Blacklist TTL as a duration.
    pub fn blacklist_ttl(&self) -> Duration {
        Duration::from_secs(self.blacklist_ttl_secs)
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            round_timeout_ms: 10_000,
            min_block_interval_ms: 5_000,
            tick_interval_ms: 100,
            timeslot_ms: 10_000,
            inbox_capacity: 1024,
            byzantine_detector: true,
            blacklist_ttl_secs: 30 * 24 * 60 * 60,
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Engine (orchestrator) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Period of the committee/role watch loop
    pub watch_interval_ms: u64,

    /// First epoch running the multi-view finality rule
    pub multiview_epoch: u64,

    /// Capacity of the outbound consensus message queue
    pub network_buffer: usize,
}

impl EngineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.watch_interval_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "watch_interval_ms",
                value: 0,
            });
        }
        if self.network_buffer == 0 {
            return Err(ConfigError::InvalidCapacity {
                name: "network_buffer",
            });
        }
        Ok(())
    }

    /// Watch interval as a duration.
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watch_interval_ms: 3_000,
            multiview_epoch: 1,
            network_buffer: 4096,
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json, compact)
    pub format: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }

        let valid_formats = ["text", "json", "compact"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.format.clone()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// =============================================================================
// Validator Configuration
// =============================================================================

/// Validator key files hosted by this node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Paths of JSON key files; relative paths resolve against the config file
    pub key_files: Vec<PathBuf>,
}

impl ValidatorConfig {
    /// Key file paths resolved against `base` (the config file's directory).
    pub fn resolved_key_files(&self, base: &Path) -> Vec<PathBuf> {
        self.key_files
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { base.join(p) })
            .collect()
    }
}

// =============================================================================
// Devnet Configuration
// =============================================================================

/// Shape of the in-memory devnet the node runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    /// Number of shard chains besides the beacon chain
    pub shards: u16,

    /// Committee size used when generating devnet keys
    pub committee_size: usize,

    /// Epoch length in blocks
    pub blocks_per_epoch: u64,
}

impl DevnetConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.shards > u8::MAX as u16 {
            return Err(ConfigError::TooManyShards(self.shards));
        }
        if self.committee_size == 0 {
            return Err(ConfigError::InvalidCommitteeSize(self.committee_size));
        }
        if self.blocks_per_epoch == 0 {
            return Err(ConfigError::InvalidCapacity {
                name: "blocks_per_epoch",
            });
        }
        Ok(())
    }
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            shards: 1,
            committee_size: 4,
            blocks_per_epoch: 100,
        }
    }
}
