//! Integration tests for the in-memory devnet.

use std::sync::Arc;
use std::time::Duration;

use meridian::{Devnet, DevnetChain, DevnetChainConfig};
use meridian_config::Config;
use meridian_consensus::{
    block_vote_bytes, BlockRequest, Chain, ChainError, CommitCertificate, Committee, RoundKey,
};
use meridian_crypto::{BlsSignature, DomainTag, ValidatorKeyPair};
use meridian_types::{ChainKey, ConsensusVersion, View};

const FAST_CONFIG: &str = r#"
[consensus]
round_timeout_ms = 2000
min_block_interval_ms = 500
tick_interval_ms = 20
timeslot_ms = 2000

[engine]
watch_interval_ms = 50
multiview_epoch = 1

[devnet]
shards = 1
committee_size = 4
blocks_per_epoch = 2
"#;

fn generate_keys(n: usize) -> Vec<ValidatorKeyPair> {
    (0..n).map(|_| ValidatorKeyPair::generate()).collect()
}

async fn wait_for_height(chain: &DevnetChain, height: u64, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if chain.height() >= height {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    chain.height() >= height
}

#[tokio::test]
async fn test_devnet_commits_on_every_chain() {
    let config = Config::from_str(FAST_CONFIG).unwrap();
    let devnet = Devnet::new(&config, generate_keys(8)).unwrap();
    devnet.start();

    let beacon = devnet.chain(ChainKey::Beacon).unwrap();
    let shard = devnet.chain(ChainKey::Shard(0)).unwrap();
    assert!(wait_for_height(&beacon, 4, Duration::from_secs(30)).await);
    assert!(wait_for_height(&shard, 4, Duration::from_secs(30)).await);

    assert_eq!(
        devnet.engine().chains(),
        vec![ChainKey::Beacon, ChainKey::Shard(0)]
    );
    let mut final_height = 0;
    for _ in 0..200 {
        final_height = beacon.final_view().map(|v| v.height()).unwrap_or_default();
        if final_height >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(final_height >= 2);
    assert!(final_height < beacon.height());

    devnet.stop().await;
}

#[tokio::test]
async fn test_devnet_switches_to_multiview_at_cutover_epoch() {
    let config = Config::from_str(FAST_CONFIG).unwrap();
    let devnet = Devnet::new(&config, generate_keys(4)).unwrap();
    devnet.start();

    let beacon = devnet.chain(ChainKey::Beacon).unwrap();
    assert!(wait_for_height(&beacon, 5, Duration::from_secs(40)).await);

    assert_eq!(
        devnet.engine().version(ChainKey::Beacon),
        Some(ConsensusVersion::MultiView)
    );
    assert_eq!(beacon.tip().version(), ConsensusVersion::MultiView);
    // only the beacon committee is filled
    assert!(devnet.chain(ChainKey::Shard(0)).is_none());

    devnet.stop().await;
}

#[tokio::test]
async fn test_pending_keys_stay_out_of_processes() {
    let config = Config::from_str(FAST_CONFIG).unwrap();
    let keys = generate_keys(9);
    let pending = keys[8].public_hex().to_string();
    let devnet = Devnet::new(&config, keys).unwrap();
    devnet.engine().sync_processes().await;

    for chain in [ChainKey::Beacon, ChainKey::Shard(0)] {
        let status = devnet.engine().status(chain).await.unwrap();
        assert_eq!(status.validators.len(), 4);
        assert!(!status.validators.contains(&pending));
    }

    devnet.stop().await;
}

#[tokio::test]
async fn test_stop_halts_block_production() {
    let config = Config::from_str(FAST_CONFIG).unwrap();
    let devnet = Devnet::new(&config, generate_keys(4)).unwrap();
    devnet.start();

    let beacon = devnet.chain(ChainKey::Beacon).unwrap();
    assert!(wait_for_height(&beacon, 2, Duration::from_secs(20)).await);

    devnet.stop().await;
    assert!(devnet.engine().chains().is_empty());
    let height = beacon.height();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(beacon.height(), height);

    devnet.stop().await;
}

#[tokio::test]
async fn test_devnet_requires_keys() {
    let config = Config::from_str(FAST_CONFIG).unwrap();
    assert!(Devnet::new(&config, Vec::new()).is_err());
}

fn single_chain(keys: &[ValidatorKeyPair], genesis_time: i64) -> DevnetChain {
    let committee = Committee::new(keys.iter().map(|k| k.public_key().clone()).collect());
    DevnetChain::new(
        ChainKey::Shard(2),
        committee,
        genesis_time,
        DevnetChainConfig {
            timeslot: Duration::from_secs(10),
            blocks_per_epoch: 100,
        },
    )
}

fn request(round: u64) -> BlockRequest {
    BlockRequest {
        version: ConsensusVersion::Legacy,
        round,
        proposer_index: 1,
        propose_time: 0,
        repropose: None,
    }
}

fn certificate(keys: &[ValidatorKeyPair], signers: &[usize], view: &View) -> CommitCertificate {
    let domain = DomainTag::new_block_vote(ChainKey::Shard(2).to_string());
    let bytes = block_vote_bytes(&view.hash(), true);
    let signatures: Vec<BlsSignature> = signers
        .iter()
        .map(|&i| keys[i].sign_with_domain(&bytes, &domain))
        .collect();
    let refs: Vec<&BlsSignature> = signatures.iter().collect();
    CommitCertificate {
        round_key: RoundKey::new(view.height(), view.round()),
        block_hash: view.hash(),
        signers: signers.to_vec(),
        aggregate_signature: BlsSignature::aggregate(&refs).unwrap(),
    }
}

#[tokio::test]
async fn test_blocks_are_stamped_into_timeslots() {
    let keys = generate_keys(4);
    let chain = single_chain(&keys, 1_000);

    let round0 = chain.create_new_block(request(0)).await.unwrap();
    assert_eq!(round0.height(), 2);
    assert_eq!(round0.propose_time(), 1_010);
    assert_eq!(round0.proposer_index(), 1);
    assert!(chain.validate_pre_sign_block(&round0).await.is_ok());

    let round2 = chain.create_new_block(request(2)).await.unwrap();
    assert_eq!(round2.propose_time(), 1_030);
    assert!(chain.validate_pre_sign_block(&round2).await.is_ok());

    // a round-0 block claiming a later slot is refused
    let restamped = View::new(round0.block().reproposed(0, 1, 1_020));
    assert!(matches!(
        chain.validate_pre_sign_block(&restamped).await,
        Err(ChainError::InvalidBlock(_))
    ));
}

#[tokio::test]
async fn test_reproposal_keeps_body_and_produce_time() {
    let keys = generate_keys(4);
    let chain = single_chain(&keys, 1_000);

    let first = Arc::new(chain.create_new_block(request(0)).await.unwrap());
    let mut later = request(1);
    later.repropose = Some(first.clone());
    let again = chain.create_new_block(later).await.unwrap();

    assert_ne!(again.hash(), first.hash());
    assert_eq!(again.block().body(), first.block().body());
    assert_eq!(again.produce_time(), first.produce_time());
    assert_eq!(again.propose_time(), 1_020);
    assert!(chain.validate_pre_sign_block(&again).await.is_ok());
}

#[tokio::test]
async fn test_insert_requires_majority_certificate() {
    let keys = generate_keys(4);
    let chain = single_chain(&keys, 1_000);
    let view = Arc::new(chain.create_new_block(request(0)).await.unwrap());

    let minority = certificate(&keys, &[0, 1], &view);
    assert!(matches!(
        chain.insert_block(view.clone(), minority, true).await,
        Err(ChainError::Insert(_))
    ));

    let mut forged = certificate(&keys, &[0, 1, 2], &view);
    forged.signers = vec![0, 1, 3];
    assert!(chain.insert_block(view.clone(), forged, true).await.is_err());
    assert_eq!(chain.height(), 1);

    let majority = certificate(&keys, &[0, 1, 2], &view);
    chain.insert_block(view.clone(), majority, true).await.unwrap();
    assert_eq!(chain.height(), 2);
    assert_eq!(chain.tip().hash(), view.hash());
    assert_eq!(chain.last_block_timestamp(), 1_010);
    assert_eq!(chain.last_proposer_index(), 1);

    // the same block cannot be inserted twice
    let again = certificate(&keys, &[0, 1, 2], &view);
    assert!(matches!(
        chain.insert_block(view, again, true).await,
        Err(ChainError::WrongHeight { expected: 3, actual: 2 })
    ));
}

#[tokio::test]
async fn test_paused_chain_creates_nothing() {
    let keys = generate_keys(4);
    let chain = single_chain(&keys, 1_000);
    chain.set_ready(false);
    assert!(!chain.is_ready());
    assert!(matches!(
        chain.create_new_block(request(0)).await,
        Err(ChainError::NotReady)
    ));
}
