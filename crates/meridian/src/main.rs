//! # Meridian Node
//!
//! Main entry point for the Meridian node.
//!
//! This binary provides:
//! - Devnet operation (beacon and shard chains driven by the consensus engine)
//! - Devnet initialization (validator key files and a default config)
//! - Validator key management

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meridian::{Devnet, ValidatorKeys, DEFAULT_CONFIG_FILE};
use meridian_config::Config;

/// Meridian node and tools
#[derive(Parser, Debug)]
#[command(name = "meridian")]
#[command(author = "Meridian Team")]
#[command(version)]
#[command(about = "Meridian sharded chain node")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format: text, json, or compact (overrides config)
    #[arg(long)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
    Compact,
}

impl LogFormat {
    fn from_config(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Text,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the devnet
    Start {
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Write validator keys and a default configuration
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Number of validator keys (default: one full committee per chain)
        #[arg(long)]
        validators: Option<usize>,
    },

    /// Key management commands
    Keys {
        #[command(subcommand)]
        command: KeysCommands,
    },

    /// Show version information
    Version,
}

#[derive(clap::Subcommand, Debug)]
enum KeysCommands {
    /// Generate a new validator key
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "validator.json")]
        output: PathBuf,
    },

    /// Show the public key of a key file
    Show {
        /// Key file path
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Start { config } => {
            let loaded = Config::load(config)
                .with_context(|| format!("Failed to load config from {}", config.display()))?;
            init_tracing(&cli, &loaded.logging.level, &loaded.logging.format);
            info!(version = meridian::VERSION, "Starting Meridian");
            handle_start(config, loaded).await
        }
        Commands::Init { output, validators } => {
            init_tracing(&cli, "info", "text");
            handle_init(output, *validators)
        }
        Commands::Keys { command } => {
            init_tracing(&cli, "info", "text");
            handle_keys(command)
        }
        Commands::Version => handle_version(),
    }
}

fn init_tracing(cli: &Cli, config_level: &str, config_format: &str) {
    let filter = match cli.verbose {
        0 => format!("{0},meridian={0}", config_level.to_lowercase()),
        1 => "info,meridian=debug".to_string(),
        2 => "debug,meridian=debug".to_string(),
        _ => "trace,meridian=trace".to_string(),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(config_format));

    match format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true))
                .with(env_filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(env_filter)
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(fmt::layer().compact())
                .with(env_filter)
                .init();
        }
    }
}

async fn handle_start(config_path: &Path, config: Config) -> Result<()> {
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    let key_files = config.validator.resolved_key_files(base);
    if key_files.is_empty() {
        bail!(
            "No validator key files configured in {}",
            config_path.display()
        );
    }

    let keys = ValidatorKeys::load_all(&key_files)?
        .into_iter()
        .map(ValidatorKeys::into_keypair)
        .collect();

    let devnet = Devnet::new(&config, keys)?;
    devnet.start();
    info!(
        chains = devnet.host().chain_keys().len(),
        shards = config.devnet.shards,
        "Devnet running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    devnet.stop().await;
    info!("Meridian stopped");
    Ok(())
}

fn handle_init(output: &Path, validators: Option<usize>) -> Result<()> {
    let mut config = Config::default();
    let validators = validators
        .unwrap_or((config.devnet.shards as usize + 1) * config.devnet.committee_size);
    if validators == 0 {
        bail!("At least one validator key is required");
    }

    info!(
        output = %output.display(),
        validators,
        "Initializing devnet"
    );

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    for i in 0..validators {
        let keys = ValidatorKeys::generate();
        let file_name = PathBuf::from(format!("validator_{}.json", i));
        keys.save(&output.join(&file_name))?;
        info!(key = %file_name.display(), public_key = %keys.public_hex(), "Generated validator key {}", i);
        config.validator.key_files.push(file_name);
    }

    let config_path = output.join(DEFAULT_CONFIG_FILE);
    config
        .save(&config_path)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;
    info!(path = %config_path.display(), "Wrote configuration");

    println!("Devnet initialized successfully!");
    println!("  Output directory: {}", output.display());
    println!("  Validators: {}", validators);
    println!("  Shards: {}", config.devnet.shards);
    println!("  Committee size: {}", config.devnet.committee_size);
    println!("  Config: {}", config_path.display());

    Ok(())
}

fn handle_keys(command: &KeysCommands) -> Result<()> {
    match command {
        KeysCommands::Generate { output } => {
            if output.exists() {
                bail!("Refusing to overwrite existing key file {}", output.display());
            }
            let keys = ValidatorKeys::generate();
            keys.save(output)?;

            println!("Generated validator key");
            println!("  File: {}", output.display());
            println!("  Public key: {}", keys.public_hex());
        }
        KeysCommands::Show { file } => {
            let keys = ValidatorKeys::load(file)?;
            println!("Validator key {}", file.display());
            println!("  Public key: {}", keys.public_hex());
        }
    }
    Ok(())
}

fn handle_version() -> Result<()> {
    println!("Meridian {}", meridian::VERSION);
    println!("  Git: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    Ok(())
}
