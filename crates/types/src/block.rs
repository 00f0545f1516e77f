//! Block variants handled by the consensus core.
//!
//! The consensus core only reads chain-position metadata from a block:
//! - [`BlockHeader`] - version, height, epoch, round, parent, proposer, times
//! - [`BeaconBlock`] / [`ShardBlock`] - the two concrete block kinds
//! - [`Block`] - the closed set of block kinds, wire-serializable
//!
//! The body is opaque bytes produced by the chain collaborator; the header
//! commits to it through `body_hash`.

use crate::{ChainKey, ConsensusVersion, Error, Result, H256};
use serde::{Deserialize, Serialize};

/// Height of a chain's genesis block.
pub const GENESIS_HEIGHT: u64 = 1;

/// Metadata shared by all block kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Consensus version the block was produced under
    pub version: ConsensusVersion,
    /// Block height
    pub height: u64,
    /// Epoch the block belongs to
    pub epoch: u64,
    /// Round (timeslot offset since the previous block) it was proposed in
    pub round: u64,
    /// Hash of the parent block (NIL for genesis)
    pub parent_hash: H256,
    /// Committee index of the proposer
    pub proposer_index: u32,
    /// Unix seconds when the block was proposed
    pub propose_time: i64,
    /// Unix seconds when the block was first produced
    pub produce_time: i64,
    /// Keccak256 of the body
    pub body_hash: H256,
}

impl BlockHeader {
    fn encode_into(&self, chain_key: ChainKey, out: &mut Vec<u8>) {
        out.extend_from_slice(chain_key.to_string().as_bytes());
        out.push(self.version.as_u8());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.epoch.to_be_bytes());
        out.extend_from_slice(&self.round.to_be_bytes());
        out.extend_from_slice(self.parent_hash.as_bytes());
        out.extend_from_slice(&self.proposer_index.to_be_bytes());
        out.extend_from_slice(&self.propose_time.to_be_bytes());
        out.extend_from_slice(&self.produce_time.to_be_bytes());
        out.extend_from_slice(self.body_hash.as_bytes());
    }

    /// Structural checks that need no chain state.
    pub fn validate_basic(&self) -> Result<()> {
        if self.height > GENESIS_HEIGHT && self.parent_hash.is_nil() {
            return Err(Error::InvalidBlock(
                "non-genesis block must have parent hash".into(),
            ));
        }
        if self.produce_time > self.propose_time {
            return Err(Error::InvalidBlock(format!(
                "produce time {} after propose time {}",
                self.produce_time, self.propose_time
            )));
        }
        Ok(())
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::BeaconBlock {}
    impl Sealed for super::ShardBlock {}
    impl Sealed for super::Block {}
}

/// Read access to the consensus-relevant parts of a block.
///
/// Sealed: implemented by [`BeaconBlock`], [`ShardBlock`] and [`Block`] only.
pub trait ConsensusBlock: sealed::Sealed {
    /// The block header.
    fn header(&self) -> &BlockHeader;

    /// Chain this block belongs to.
    fn chain_key(&self) -> ChainKey;

    /// Identity hash: Keccak256 over the chain key and the header fields.
    fn hash(&self) -> H256 {
        let mut buf = Vec::with_capacity(128);
        self.header().encode_into(self.chain_key(), &mut buf);
        H256::keccak256(&buf)
    }

    /// Block height.
    fn height(&self) -> u64 {
        self.header().height
    }

    /// Parent hash.
    fn parent_hash(&self) -> H256 {
        self.header().parent_hash
    }

    /// Epoch.
    fn epoch(&self) -> u64 {
        self.header().epoch
    }

    /// Proposal round.
    fn round(&self) -> u64 {
        self.header().round
    }

    /// Committee index of the proposer.
    fn proposer_index(&self) -> u32 {
        self.header().proposer_index
    }

    /// Propose timestamp.
    fn propose_time(&self) -> i64 {
        self.header().propose_time
    }

    /// Produce timestamp.
    fn produce_time(&self) -> i64 {
        self.header().produce_time
    }

    /// Consensus version.
    fn version(&self) -> ConsensusVersion {
        self.header().version
    }
}

/// A beacon chain block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlock {
    /// Header
    pub header: BlockHeader,
    /// Opaque body
    #[serde(with = "hex_bytes")]
    pub body: Vec<u8>,
}

impl ConsensusBlock for BeaconBlock {
    fn header(&self) -> &BlockHeader {
        &self.header
    }

    fn chain_key(&self) -> ChainKey {
        ChainKey::Beacon
    }
}

/// A shard chain block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardBlock {
    /// Shard index
    pub shard_id: u8,
    /// Header
    pub header: BlockHeader,
    /// Number of cross-shard outputs referenced by the body
    pub cross_shard_outputs: u32,
    /// Opaque body
    #[serde(with = "hex_bytes")]
    pub body: Vec<u8>,
}

impl ConsensusBlock for ShardBlock {
    fn header(&self) -> &BlockHeader {
        &self.header
    }

    fn chain_key(&self) -> ChainKey {
        ChainKey::Shard(self.shard_id)
    }
}

/// Any block the consensus core can vote on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    /// Beacon chain block
    Beacon(BeaconBlock),
    /// Shard chain block
    Shard(ShardBlock),
}

impl Block {
    /// Build a block for `chain_key` from a header and body.
    ///
    /// `header.body_hash` is overwritten with the hash of `body`.
    pub fn new(chain_key: ChainKey, mut header: BlockHeader, body: Vec<u8>) -> Self {
        header.body_hash = H256::keccak256(&body);
        match chain_key {
            ChainKey::Beacon => Block::Beacon(BeaconBlock { header, body }),
            ChainKey::Shard(shard_id) => Block::Shard(ShardBlock {
                shard_id,
                header,
                cross_shard_outputs: 0,
                body,
            }),
        }
    }

    /// Genesis block of a chain.
    pub fn genesis(chain_key: ChainKey, timestamp: i64) -> Self {
        let header = BlockHeader {
            version: ConsensusVersion::Legacy,
            height: GENESIS_HEIGHT,
            epoch: 0,
            round: 0,
            parent_hash: H256::NIL,
            proposer_index: 0,
            propose_time: timestamp,
            produce_time: timestamp,
            body_hash: H256::NIL,
        };
        Self::new(chain_key, header, Vec::new())
    }

    /// The opaque body.
    pub fn body(&self) -> &[u8] {
        match self {
            Block::Beacon(b) => &b.body,
            Block::Shard(b) => &b.body,
        }
    }

    /// The same block re-stamped for a later round.
    ///
    /// Body, parent and produce time are kept; only the round, proposer and
    /// propose time change, so the copy hashes differently.
    pub fn reproposed(&self, round: u64, proposer_index: u32, propose_time: i64) -> Self {
        let mut block = self.clone();
        let header = match &mut block {
            Block::Beacon(b) => &mut b.header,
            Block::Shard(b) => &mut b.header,
        };
        header.round = round;
        header.proposer_index = proposer_index;
        header.propose_time = propose_time;
        block
    }

    /// Structural checks, including that the body matches `body_hash`.
    pub fn validate_basic(&self) -> Result<()> {
        self.header().validate_basic()?;
        if H256::keccak256(self.body()) != self.header().body_hash {
            return Err(Error::InvalidBlock("body hash mismatch".into()));
        }
        Ok(())
    }
}

impl ConsensusBlock for Block {
    fn header(&self) -> &BlockHeader {
        match self {
            Block::Beacon(b) => &b.header,
            Block::Shard(b) => &b.header,
        }
    }

    fn chain_key(&self) -> ChainKey {
        match self {
            Block::Beacon(b) => b.chain_key(),
            Block::Shard(b) => b.chain_key(),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
