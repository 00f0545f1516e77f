//! The chain collaborator consumed by the round state machine.
//!
//! Block construction, validation and storage live outside the consensus
//! core. A [`Chain`] implementation exposes exactly what a round needs: the
//! chain tip, the committee, and the create / pre-sign validate / insert
//! operations.

use std::sync::Arc;

use async_trait::async_trait;
use meridian_crypto::BlsPublicKey;
use meridian_types::{ChainKey, ConsensusVersion, View, H256};

use crate::committee::Committee;
use crate::message::CommitCertificate;

/// Errors reported by a chain collaborator
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Chain is still syncing
    #[error("chain not ready")]
    NotReady,

    /// Block failed validation
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Parent block is unknown
    #[error("unknown parent {0}")]
    UnknownParent(H256),

    /// Block is not at the next height
    #[error("wrong height: expected {expected}, got {actual}")]
    WrongHeight {
        /// Next height of the chain
        expected: u64,
        /// Height of the block
        actual: u64,
    },

    /// Block could not be created
    #[error("failed to create block: {0}")]
    CreateFailed(String),

    /// Block could not be stored
    #[error("failed to insert block: {0}")]
    Insert(String),
}

/// Parameters for creating a block
#[derive(Debug, Clone)]
pub struct BlockRequest {
    /// Consensus version of the running process
    pub version: ConsensusVersion,
    /// Round the block is proposed in
    pub round: u64,
    /// Committee index of the proposer
    pub proposer_index: usize,
    /// Unix seconds the proposal is made at
    pub propose_time: i64,
    /// Earlier valid block of the same height to propose again
    pub repropose: Option<Arc<View>>,
}

/// Chain collaborator
#[async_trait]
pub trait Chain: Send + Sync {
    /// Key of the chain
    fn chain_key(&self) -> ChainKey;

    /// Height of the last inserted block
    fn height(&self) -> u64;

    /// Unix seconds of the last inserted block's propose time
    fn last_block_timestamp(&self) -> i64;

    /// Committee voting on the next block
    fn committee(&self) -> Committee;

    /// Committee size
    fn committee_size(&self) -> usize {
        self.committee().len()
    }

    /// Committee index of a validator
    fn proposer_index(&self, pubkey: &BlsPublicKey) -> Option<usize> {
        self.committee().index_of(pubkey)
    }

    /// Committee index of the last block's proposer
    fn last_proposer_index(&self) -> usize;

    /// Whether the chain is synced and may produce blocks
    fn is_ready(&self) -> bool;

    /// Epoch of the chain tip
    fn epoch(&self) -> u64;

    /// Final view of the chain's view graph, if it keeps one
    fn final_view(&self) -> Option<Arc<View>> {
        None
    }

    /// Create a block at `height() + 1`
    async fn create_new_block(&self, request: BlockRequest) -> Result<View, ChainError>;

    /// Validate a proposed block before voting for it
    async fn validate_pre_sign_block(&self, view: &View) -> Result<(), ChainError>;

    /// Insert a block the committee decided on
    async fn insert_block(
        &self,
        view: Arc<View>,
        certificate: CommitCertificate,
        is_valid: bool,
    ) -> Result<(), ChainError>;
}
