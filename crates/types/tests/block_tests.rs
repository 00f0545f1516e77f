//! Tests for block variants and views

use meridian_types::{
    Block, BlockHeader, ChainKey, ConsensusBlock, ConsensusVersion, View, GENESIS_HEIGHT, H256,
};

fn child_header(parent: &View, time: i64) -> BlockHeader {
    BlockHeader {
        version: ConsensusVersion::MultiView,
        height: parent.height() + 1,
        epoch: 1,
        round: 0,
        parent_hash: parent.hash(),
        proposer_index: 2,
        propose_time: time,
        produce_time: time,
        body_hash: H256::NIL,
    }
}

#[test]
fn test_genesis_block() {
    let genesis = Block::genesis(ChainKey::Beacon, 1_000);
    assert_eq!(genesis.height(), GENESIS_HEIGHT);
    assert!(genesis.parent_hash().is_nil());
    assert_eq!(genesis.chain_key(), ChainKey::Beacon);
    assert!(genesis.validate_basic().is_ok());
}

#[test]
fn test_hash_depends_on_chain_key() {
    let beacon = Block::genesis(ChainKey::Beacon, 1_000);
    let shard0 = Block::genesis(ChainKey::Shard(0), 1_000);
    let shard1 = Block::genesis(ChainKey::Shard(1), 1_000);
    assert_ne!(beacon.hash(), shard0.hash());
    assert_ne!(shard0.hash(), shard1.hash());
}

#[test]
fn test_hash_commits_to_body() {
    let parent = View::new(Block::genesis(ChainKey::Shard(0), 1_000));
    let a = Block::new(ChainKey::Shard(0), child_header(&parent, 1_010), vec![1, 2, 3]);
    let b = Block::new(ChainKey::Shard(0), child_header(&parent, 1_010), vec![1, 2, 4]);
    assert_ne!(a.hash(), b.hash());
    assert_eq!(a.header().body_hash, H256::keccak256(&[1, 2, 3]));
}

#[test]
fn test_view_caches_block_fields() {
    let parent = View::new(Block::genesis(ChainKey::Beacon, 1_000));
    let block = Block::new(ChainKey::Beacon, child_header(&parent, 1_010), vec![9]);
    let view = View::new(block.clone());

    assert_eq!(view.hash(), block.hash());
    assert_eq!(view.parent_hash(), parent.hash());
    assert_eq!(view.height(), GENESIS_HEIGHT + 1);
    assert_eq!(view.proposer_index(), 2);
    assert_eq!(view.version(), ConsensusVersion::MultiView);
    assert_eq!(view.into_block(), block);
}

#[test]
fn test_validate_basic_rejects_orphan_header() {
    let mut header = child_header(&View::new(Block::genesis(ChainKey::Beacon, 0)), 10);
    header.parent_hash = H256::NIL;
    let block = Block::new(ChainKey::Beacon, header, vec![]);
    assert!(block.validate_basic().is_err());
}

#[test]
fn test_validate_basic_rejects_produce_after_propose() {
    let mut header = child_header(&View::new(Block::genesis(ChainKey::Beacon, 0)), 10);
    header.produce_time = 11;
    let block = Block::new(ChainKey::Beacon, header, vec![]);
    assert!(block.validate_basic().is_err());
}

#[test]
fn test_validate_basic_rejects_tampered_body() {
    let parent = View::new(Block::genesis(ChainKey::Shard(3), 0));
    let mut block = Block::new(ChainKey::Shard(3), child_header(&parent, 10), vec![1]);
    if let Block::Shard(inner) = &mut block {
        inner.body.push(2);
    }
    assert!(block.validate_basic().is_err());
}

#[test]
fn test_block_json_round_trip() {
    let parent = View::new(Block::genesis(ChainKey::Shard(1), 0));
    let block = Block::new(ChainKey::Shard(1), child_header(&parent, 10), vec![0xab, 0xcd]);
    let json = serde_json::to_string(&block).unwrap();
    assert!(json.contains("\"kind\":\"shard\""));
    assert!(json.contains("\"abcd\""));
    let decoded: Block = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, block);
    assert_eq!(decoded.hash(), block.hash());
}

#[test]
fn test_reproposed_block_keeps_body_and_produce_time() {
    let genesis = View::new(Block::genesis(ChainKey::Shard(1), 1_000));
    let block = Block::new(ChainKey::Shard(1), child_header(&genesis, 1_010), b"txs".to_vec());
    let again = block.reproposed(1, 3, 1_020);

    assert_ne!(again.hash(), block.hash());
    assert_eq!(again.produce_time(), 1_010);
    assert_eq!(again.propose_time(), 1_020);
    assert_eq!(again.round(), 1);
    assert_eq!(again.proposer_index(), 3);
    assert_eq!(again.body(), block.body());
    assert_eq!(again.parent_hash(), genesis.hash());
    assert!(again.validate_basic().is_ok());
}
