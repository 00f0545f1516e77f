//! Immutable views of candidate blocks.

use crate::block::{Block, ConsensusBlock};
use crate::{ChainKey, ConsensusVersion, H256};

/// One candidate block plus its cached identity hash.
///
/// Views never change after construction, so they are shared as `Arc<View>`
/// between the view graph, the round state machine and external readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    hash: H256,
    block: Block,
}

impl View {
    /// Wrap a block, computing its hash once.
    pub fn new(block: Block) -> Self {
        let hash = block.hash();
        Self { hash, block }
    }

    /// Identity hash.
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// Parent hash.
    pub fn parent_hash(&self) -> H256 {
        self.block.parent_hash()
    }

    /// Height.
    pub fn height(&self) -> u64 {
        self.block.height()
    }

    /// Epoch.
    pub fn epoch(&self) -> u64 {
        self.block.epoch()
    }

    /// Round the block was proposed in.
    pub fn round(&self) -> u64 {
        self.block.round()
    }

    /// Committee index of the proposer.
    pub fn proposer_index(&self) -> u32 {
        self.block.proposer_index()
    }

    /// Propose timestamp (unix seconds).
    pub fn propose_time(&self) -> i64 {
        self.block.propose_time()
    }

    /// Produce timestamp (unix seconds).
    pub fn produce_time(&self) -> i64 {
        self.block.produce_time()
    }

    /// Consensus version the block was produced under.
    pub fn version(&self) -> ConsensusVersion {
        self.block.version()
    }

    /// Chain the block belongs to.
    pub fn chain_key(&self) -> ChainKey {
        self.block.chain_key()
    }

    /// The underlying block.
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Unwrap into the underlying block.
    pub fn into_block(self) -> Block {
        self.block
    }
}

impl From<Block> for View {
    fn from(block: Block) -> Self {
        View::new(block)
    }
}
