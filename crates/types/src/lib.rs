//! # Meridian Types
//!
//! Core type definitions shared by the Meridian consensus core.
//!
//! - [`H256`] - 32-byte Keccak256 hashes
//! - [`ChainKey`] - beacon chain or shard index
//! - [`ConsensusVersion`] - legacy or multi-view finality
//! - [`Block`], [`BeaconBlock`], [`ShardBlock`] - block variants behind the sealed
//!   [`ConsensusBlock`] trait
//! - [`View`] - immutable, hashed wrapper of a candidate block
//!
//! ## Example
//!
//! ```rust
//! use meridian_types::{Block, ChainKey, View, H256};
//!
//! let genesis = View::new(Block::genesis(ChainKey::Shard(0), 1_700_000_000));
//! assert_eq!(genesis.parent_hash(), H256::NIL);
//! assert_eq!(genesis.chain_key().to_string(), "shard-0");
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod block;
pub mod chain;
pub mod hash;
pub mod view;

pub use block::{BeaconBlock, Block, BlockHeader, ConsensusBlock, ShardBlock, GENESIS_HEIGHT};
pub use chain::{ChainKey, ConsensusVersion};
pub use hash::H256;
pub use view::View;

/// Result type alias for Meridian types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with Meridian types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid hash format
    #[error("invalid hash format: {0}")]
    InvalidHash(String),

    /// Unknown chain key
    #[error("invalid chain key: {0}")]
    InvalidChainKey(String),

    /// Block failed structural checks
    #[error("invalid block: {0}")]
    InvalidBlock(String),
}
