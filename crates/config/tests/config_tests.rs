//! Tests for Config module

use meridian_config::{
    Config, ConfigError, ConsensusConfig, DevnetConfig, EngineConfig, LoggingConfig,
    ValidatorConfig,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.consensus.round_timeout_ms, 10_000);
    assert_eq!(config.consensus.min_block_interval_ms, 5_000);
    assert_eq!(config.consensus.tick_interval_ms, 100);
    assert_eq!(config.engine.watch_interval_ms, 3_000);
    assert_eq!(config.logging.level, "info");
    assert!(config.validator.key_files.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_consensus_durations() {
    let config = ConsensusConfig::default();
    assert_eq!(config.round_timeout(), Duration::from_secs(10));
    assert_eq!(config.min_block_interval(), Duration::from_secs(5));
    assert_eq!(config.tick_interval(), Duration::from_millis(100));
    assert_eq!(config.blacklist_ttl(), Duration::from_secs(30 * 24 * 3600));
}

#[test]
fn test_zero_round_timeout_rejected() {
    let config = ConsensusConfig {
        round_timeout_ms: 0,
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTimeout {
            name: "round_timeout_ms",
            value: 0
        })
    ));
}

#[test]
fn test_min_interval_must_be_below_timeout() {
    let config = ConsensusConfig {
        round_timeout_ms: 5_000,
        min_block_interval_ms: 5_000,
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidInterval {
            interval: 5_000,
            timeout: 5_000
        })
    ));
}

#[test]
fn test_zero_inbox_rejected() {
    let config = ConsensusConfig {
        inbox_capacity: 0,
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidCapacity {
            name: "inbox_capacity"
        })
    ));
}

#[test]
fn test_engine_validation() {
    let mut config = EngineConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.watch_interval(), Duration::from_secs(3));

    config.watch_interval_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_log_level() {
    let config = LoggingConfig {
        level: "verbose".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidLogLevel(level)) if level == "verbose"
    ));
}

#[test]
fn test_log_level_case_insensitive() {
    let config = LoggingConfig {
        level: "DEBUG".to_string(),
        format: "Json".to_string(),
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_log_format() {
    let config = LoggingConfig {
        format: "xml".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidLogFormat(_))
    ));
}

#[test]
fn test_devnet_validation() {
    let config = DevnetConfig {
        shards: 256,
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::TooManyShards(256))
    ));

    let config = DevnetConfig {
        committee_size: 0,
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidCommitteeSize(0))
    ));
}

#[test]
fn test_partial_toml_uses_defaults() {
    let toml = r#"
        [consensus]
        round_timeout_ms = 30000

        [engine]
        multiview_epoch = 10
    "#;

    let config = Config::from_str(toml).unwrap();
    assert_eq!(config.consensus.round_timeout_ms, 30_000);
    assert_eq!(config.consensus.min_block_interval_ms, 5_000);
    assert_eq!(config.engine.multiview_epoch, 10);
    assert_eq!(config.engine.watch_interval_ms, 3_000);
    assert_eq!(config.devnet.committee_size, 4);
}

#[test]
fn test_from_str_runs_validation() {
    let toml = r#"
        [logging]
        level = "loud"
    "#;
    assert!(matches!(
        Config::from_str(toml),
        Err(ConfigError::InvalidLogLevel(_))
    ));
}

#[test]
fn test_malformed_toml() {
    assert!(matches!(
        Config::from_str("[consensus\nround_timeout_ms = 1"),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meridian.toml");

    let mut config = Config::default();
    config.consensus.round_timeout_ms = 20_000;
    config.validator.key_files = vec![PathBuf::from("keys/validator-0.json")];
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.consensus.round_timeout_ms, 20_000);
    assert_eq!(
        loaded.validator.key_files,
        vec![PathBuf::from("keys/validator-0.json")]
    );
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.toml");
    assert!(matches!(
        Config::load(&path),
        Err(ConfigError::FileRead { .. })
    ));
}

#[test]
fn test_key_files_resolve_against_base() {
    let config = ValidatorConfig {
        key_files: vec![PathBuf::from("a.json"), PathBuf::from("/abs/b.json")],
    };
    let resolved = config.resolved_key_files(Path::new("/etc/meridian"));
    assert_eq!(resolved[0], PathBuf::from("/etc/meridian/a.json"));
    assert_eq!(resolved[1], PathBuf::from("/abs/b.json"));
}
