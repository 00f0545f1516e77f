//! # Meridian Configuration
//!
//! Configuration parsing for the Meridian node.
//!
//! All node settings live in one `meridian.toml` file. Every section has
//! defaults, so an empty file is a valid configuration.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("meridian.toml"))?;
//! println!("Round timeout: {}ms", config.consensus.round_timeout_ms);
//! ```
//!
//! ## Configuration Sections
//!
//! - `[consensus]` - Round timing, inbox sizing, byzantine detector
//! - `[engine]` - Committee watch cadence and multi-view cutover epoch
//! - `[logging]` - Log level and format
//! - `[validator]` - Validator key files
//! - `[devnet]` - In-memory devnet shape (shard count, committee size)

mod config;
mod error;

pub use config::*;
pub use error::*;
