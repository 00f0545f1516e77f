//! # Meridian
//!
//! Meridian is a sharded chain whose beacon and shard chains are each driven
//! by a BFT round state machine.
//!
//! This crate provides the node binary and can also be used as a library to
//! embed an in-memory devnet into other applications or tests.
//!
//! ## Components
//!
//! - [`Devnet`] - Beacon plus shard chains, consensus engine and loopback network
//! - [`ValidatorKeys`] - Validator key files
//! - [`engine_config`] - Consensus engine settings from a [`Config`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use meridian::{Devnet, ValidatorKeys};
//! use meridian_config::Config;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Path::new("meridian.toml"))?;
//!     let key_files = config.validator.resolved_key_files(Path::new("."));
//!     let keys = ValidatorKeys::load_all(&key_files)?;
//!
//!     let devnet = Devnet::new(&config, keys.into_iter().map(|k| k.into_keypair()).collect())?;
//!     devnet.start();
//!     tokio::signal::ctrl_c().await?;
//!     devnet.stop().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod devnet;
pub mod validator;

pub use devnet::{assigned_chain, Devnet, DevnetChain, DevnetChainConfig, DevnetHost};
pub use validator::ValidatorKeys;

use meridian_config::Config;
use meridian_consensus::{ByzantineConfig, EngineConfig, TimeoutConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "meridian.toml";

/// Consensus engine settings for a node configuration
pub fn engine_config(config: &Config) -> EngineConfig {
    EngineConfig {
        watch_interval: config.engine.watch_interval(),
        multiview_epoch: config.engine.multiview_epoch,
        timeouts: TimeoutConfig {
            round_timeout: config.consensus.round_timeout(),
            min_block_interval: config.consensus.min_block_interval(),
            tick_interval: config.consensus.tick_interval(),
            timeslot: config.consensus.timeslot(),
        },
        inbox_capacity: config.consensus.inbox_capacity,
        byzantine: ByzantineConfig {
            enabled: config.consensus.byzantine_detector,
            blacklist_ttl: config.consensus.blacklist_ttl(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(DEFAULT_CONFIG_FILE, "meridian.toml");
    }

    #[test]
    fn test_engine_config_from_defaults() {
        let engine = engine_config(&Config::default());
        assert_eq!(engine.timeouts, TimeoutConfig::default());
        assert_eq!(engine.watch_interval, Duration::from_secs(3));
        assert_eq!(engine.multiview_epoch, 1);
        assert!(engine.byzantine.enabled);
        assert_eq!(engine.byzantine.blacklist_ttl, meridian_consensus::DEFAULT_BLACKLIST_TTL);
    }

    #[test]
    fn test_engine_config_follows_overrides() {
        let config = Config::from_str(
            r#"
            [consensus]
            round_timeout_ms = 4000
            min_block_interval_ms = 1000
            byzantine_detector = false

            [engine]
            multiview_epoch = 7
            "#,
        )
        .unwrap();
        let engine = engine_config(&config);
        assert_eq!(engine.timeouts.round_timeout, Duration::from_millis(4000));
        assert_eq!(engine.timeouts.min_block_interval, Duration::from_millis(1000));
        assert_eq!(engine.multiview_epoch, 7);
        assert!(!engine.byzantine.enabled);
    }
}
