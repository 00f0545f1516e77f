//! In-memory devnet.
//!
//! Runs a beacon chain and `shards` shard chains inside one process. Every
//! chain keeps its blocks in a [`MultiView`] graph, and every committee
//! member is a local key, so consensus messages only travel over a loopback
//! channel back into the engine.
//!
//! Keys are assigned to chains in order: the first `committee_size` keys form
//! the beacon committee, the next `committee_size` the committee of shard 0,
//! and so on. Keys left over once every chain has a full committee are
//! pending.
//!
//! Blocks are stamped into timeslots: a block proposed in round `r` after a
//! block stamped `t` carries `propose_time = t + timeslot * (r + 1)`, so
//! blocks decided in round 0 fill consecutive slots.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use meridian_config::Config;
use meridian_consensus::{
    majority_threshold, now_secs, BlockRequest, Chain, ChainError, CommitCertificate, Committee,
    CommitteeRole, ConsensusHost, ConsensusMessage, Engine, MultiView, Tips, ValidatorRole,
    ViewGraph,
};
use meridian_crypto::{BlsPublicKey, ValidatorKeyPair};
use meridian_types::{Block, BlockHeader, ChainKey, View, H256};

/// Timing and epoch parameters of a devnet chain
#[derive(Debug, Clone)]
pub struct DevnetChainConfig {
    /// Timeslot length used for stamping and for finality
    pub timeslot: Duration,
    /// Epoch length in blocks
    pub blocks_per_epoch: u64,
}

impl DevnetChainConfig {
    fn timeslot_secs(&self) -> i64 {
        (self.timeslot.as_secs() as i64).max(1)
    }
}

/// A chain kept entirely in memory
pub struct DevnetChain {
    key: ChainKey,
    committee: Committee,
    config: DevnetChainConfig,
    views: MultiView,
    tip: RwLock<Arc<View>>,
    ready: AtomicBool,
}

impl DevnetChain {
    /// Create a chain holding only its genesis block.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        key: ChainKey,
        committee: Committee,
        genesis_time: i64,
        config: DevnetChainConfig,
    ) -> Self {
        let genesis = Arc::new(View::new(Block::genesis(key, genesis_time)));
        let mut graph = ViewGraph::new(config.timeslot);
        graph.add_view(genesis.clone());

        Self {
            key,
            committee,
            config,
            views: MultiView::spawn(graph),
            tip: RwLock::new(genesis),
            ready: AtomicBool::new(true),
        }
    }

    /// Last inserted block
    pub fn tip(&self) -> Arc<View> {
        self.tip.read().clone()
    }

    /// Subscribe to best/final changes of the view graph
    pub fn subscribe(&self) -> watch::Receiver<Tips> {
        self.views.subscribe()
    }

    /// Pause or resume block production
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Propose time a block of `round` on top of `parent` must carry
    pub fn stamp(&self, parent: &View, round: u64) -> i64 {
        let slots = (round as i64).saturating_add(1);
        parent
            .propose_time()
            .saturating_add(self.config.timeslot_secs().saturating_mul(slots))
    }

    fn epoch_at(&self, height: u64) -> u64 {
        height / self.config.blocks_per_epoch.max(1)
    }
}

impl std::fmt::Debug for DevnetChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tip = self.tip();
        f.debug_struct("DevnetChain")
            .field("key", &self.key)
            .field("height", &tip.height())
            .field("tip", &tip.hash())
            .field("committee", &self.committee.len())
            .finish()
    }
}

#[async_trait]
impl Chain for DevnetChain {
    fn chain_key(&self) -> ChainKey {
        self.key
    }

    fn height(&self) -> u64 {
        self.tip.read().height()
    }

    fn last_block_timestamp(&self) -> i64 {
        self.tip.read().propose_time()
    }

    fn committee(&self) -> Committee {
        self.committee.clone()
    }

    fn last_proposer_index(&self) -> usize {
        self.tip.read().proposer_index() as usize
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn epoch(&self) -> u64 {
        self.epoch_at(self.height())
    }

    fn final_view(&self) -> Option<Arc<View>> {
        self.views.final_view()
    }

    async fn create_new_block(&self, request: BlockRequest) -> Result<View, ChainError> {
        if !self.is_ready() {
            return Err(ChainError::NotReady);
        }
        let parent = self.tip();
        let proposer_index = u32::try_from(request.proposer_index)
            .map_err(|_| ChainError::CreateFailed("proposer index out of range".into()))?;
        let propose_time = self.stamp(&parent, request.round);

        if let Some(earlier) = request.repropose {
            if earlier.parent_hash() == parent.hash() && earlier.height() == parent.height() + 1 {
                debug!(
                    chain = %self.key,
                    height = earlier.height(),
                    block_hash = %earlier.hash().short(),
                    "Re-proposing earlier block"
                );
                let block = earlier
                    .block()
                    .reproposed(request.round, proposer_index, propose_time);
                return Ok(View::new(block));
            }
        }

        let height = parent.height() + 1;
        let header = BlockHeader {
            version: request.version,
            height,
            epoch: self.epoch_at(parent.height()),
            round: request.round,
            parent_hash: parent.hash(),
            proposer_index,
            propose_time,
            produce_time: propose_time,
            body_hash: H256::NIL,
        };
        let body = format!("{}:{}:{}", self.key, height, request.round).into_bytes();
        Ok(View::new(Block::new(self.key, header, body)))
    }

    async fn validate_pre_sign_block(&self, view: &View) -> Result<(), ChainError> {
        view.block()
            .validate_basic()
            .map_err(|err| ChainError::InvalidBlock(err.to_string()))?;
        if view.chain_key() != self.key {
            return Err(ChainError::InvalidBlock(format!(
                "block for {} on {}",
                view.chain_key(),
                self.key
            )));
        }

        let parent = self.tip();
        if view.height() != parent.height() + 1 {
            return Err(ChainError::WrongHeight {
                expected: parent.height() + 1,
                actual: view.height(),
            });
        }
        if view.parent_hash() != parent.hash() {
            return Err(ChainError::UnknownParent(view.parent_hash()));
        }
        if view.epoch() != self.epoch_at(parent.height()) {
            return Err(ChainError::InvalidBlock(format!(
                "wrong epoch {}",
                view.epoch()
            )));
        }
        let expected = self.stamp(&parent, view.round());
        if view.propose_time() != expected {
            return Err(ChainError::InvalidBlock(format!(
                "propose time {} outside slot, expected {}",
                view.propose_time(),
                expected
            )));
        }
        if view.proposer_index() as usize >= self.committee.len() {
            return Err(ChainError::InvalidBlock("unknown proposer".into()));
        }
        Ok(())
    }

    async fn insert_block(
        &self,
        view: Arc<View>,
        certificate: CommitCertificate,
        is_valid: bool,
    ) -> Result<(), ChainError> {
        if certificate.block_hash != view.hash() {
            return Err(ChainError::Insert("certificate is for another block".into()));
        }
        if certificate.signers.len() <= majority_threshold(self.committee.len()) {
            return Err(ChainError::Insert(format!(
                "{} signers are not a majority",
                certificate.signers.len()
            )));
        }
        if !certificate.verify(&self.committee, self.key) {
            return Err(ChainError::Insert("certificate does not verify".into()));
        }

        let parent = self.tip();
        if view.height() != parent.height() + 1 {
            return Err(ChainError::WrongHeight {
                expected: parent.height() + 1,
                actual: view.height(),
            });
        }
        if view.parent_hash() != parent.hash() {
            return Err(ChainError::UnknownParent(view.parent_hash()));
        }
        if !is_valid {
            warn!(
                chain = %self.key,
                height = view.height(),
                block_hash = %view.hash().short(),
                "Inserting block the local validator rejected"
            );
        }

        if !self.views.add_view(view.clone()).await {
            return Err(ChainError::Insert("view graph refused block".into()));
        }
        *self.tip.write() = view.clone();

        info!(
            chain = %self.key,
            height = view.height(),
            epoch = view.epoch(),
            version = %view.version(),
            final_height = self.views.final_view().map(|v| v.height()).unwrap_or_default(),
            "Block inserted"
        );
        Ok(())
    }
}

/// Chain a key at position `index` of the local key list belongs to
pub fn assigned_chain(index: usize, committee_size: usize, shards: u16) -> Option<ChainKey> {
    let chain_index = index / committee_size.max(1);
    match chain_index {
        0 => Some(ChainKey::Beacon),
        n if n <= shards as usize => u8::try_from(n - 1).ok().map(ChainKey::Shard),
        _ => None,
    }
}

/// Role source and chain registry of the devnet
#[derive(Debug)]
pub struct DevnetHost {
    roles: HashMap<BlsPublicKey, ValidatorRole>,
    chains: BTreeMap<ChainKey, Arc<DevnetChain>>,
}

impl DevnetHost {
    /// Assign `keys` to chains and create one chain per non-empty committee
    pub fn new(
        keys: &[ValidatorKeyPair],
        committee_size: usize,
        shards: u16,
        genesis_time: i64,
        config: DevnetChainConfig,
    ) -> Self {
        let mut roles = HashMap::new();
        let mut members: BTreeMap<ChainKey, Vec<BlsPublicKey>> = BTreeMap::new();

        for (index, key) in keys.iter().enumerate() {
            let role = match assigned_chain(index, committee_size, shards) {
                Some(chain) => {
                    members.entry(chain).or_default().push(key.public_key().clone());
                    ValidatorRole::committee(chain)
                }
                None => ValidatorRole {
                    role: CommitteeRole::Pending,
                    chain: None,
                },
            };
            roles.insert(key.public_key().clone(), role);
        }

        let chains = members
            .into_iter()
            .map(|(chain, members)| {
                let committee = Committee::new(members);
                let devnet_chain = DevnetChain::new(chain, committee, genesis_time, config.clone());
                (chain, Arc::new(devnet_chain))
            })
            .collect();

        Self { roles, chains }
    }

    /// A devnet chain by key
    pub fn devnet_chain(&self, key: ChainKey) -> Option<&Arc<DevnetChain>> {
        self.chains.get(&key)
    }

    /// Keys of every chain, beacon first
    pub fn chain_keys(&self) -> Vec<ChainKey> {
        self.chains.keys().copied().collect()
    }
}

impl ConsensusHost for DevnetHost {
    fn role(&self, pubkey: &BlsPublicKey) -> ValidatorRole {
        self.roles.get(pubkey).copied().unwrap_or_default()
    }

    fn chain(&self, key: ChainKey) -> Option<Arc<dyn Chain>> {
        self.chains.get(&key).map(|c| c.clone() as Arc<dyn Chain>)
    }
}

/// A running devnet: chains, engine, and loopback network
pub struct Devnet {
    host: Arc<DevnetHost>,
    engine: Engine,
    network: Mutex<Option<JoinHandle<()>>>,
}

impl Devnet {
    /// Build the devnet described by `config` for the local `keys`.
    ///
    /// Must be called inside a tokio runtime. The engine is not started.
    pub fn new(config: &Config, keys: Vec<ValidatorKeyPair>) -> Result<Self> {
        if keys.is_empty() {
            bail!("devnet needs at least one validator key");
        }

        let chain_config = DevnetChainConfig {
            timeslot: config.consensus.timeslot(),
            blocks_per_epoch: config.devnet.blocks_per_epoch,
        };
        let genesis_time = now_secs();
        let host = Arc::new(DevnetHost::new(
            &keys,
            config.devnet.committee_size,
            config.devnet.shards,
            genesis_time,
            chain_config,
        ));
        info!(
            chains = host.chains.len(),
            validators = keys.len(),
            genesis_time,
            "Created devnet"
        );

        let (network_tx, network_rx) = mpsc::channel(config.engine.network_buffer);
        let engine = Engine::new(crate::engine_config(config), host.clone(), keys, network_tx);
        let network = tokio::spawn(loopback(engine.clone(), network_rx));

        Ok(Self {
            host,
            engine,
            network: Mutex::new(Some(network)),
        })
    }

    /// Start consensus on every chain
    pub fn start(&self) {
        self.engine.start();
    }

    /// Stop consensus and the loopback network
    pub async fn stop(&self) {
        self.engine.stop().await;
        let network = self.network.lock().take();
        if let Some(network) = network {
            network.abort();
            let _ = network.await;
            debug!("Loopback network stopped");
        }
    }

    /// The consensus engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The role and chain registry
    pub fn host(&self) -> &Arc<DevnetHost> {
        &self.host
    }

    /// A devnet chain by key
    pub fn chain(&self, key: ChainKey) -> Option<Arc<DevnetChain>> {
        self.host.devnet_chain(key).cloned()
    }
}

async fn loopback(engine: Engine, mut network_rx: mpsc::Receiver<ConsensusMessage>) {
    while let Some(msg) = network_rx.recv().await {
        let chain = msg.chain_key;
        if let Err(err) = engine.on_message(msg) {
            trace!(chain = %chain, error = %err, "Dropping loopback message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assigned_chain() {
        assert_eq!(assigned_chain(0, 4, 2), Some(ChainKey::Beacon));
        assert_eq!(assigned_chain(3, 4, 2), Some(ChainKey::Beacon));
        assert_eq!(assigned_chain(4, 4, 2), Some(ChainKey::Shard(0)));
        assert_eq!(assigned_chain(11, 4, 2), Some(ChainKey::Shard(1)));
        assert_eq!(assigned_chain(12, 4, 2), None);
        assert_eq!(assigned_chain(1, 4, 0), Some(ChainKey::Beacon));
        assert_eq!(assigned_chain(4, 4, 0), None);
    }

    #[tokio::test]
    async fn test_host_roles_and_chains() {
        let keys: Vec<ValidatorKeyPair> = (0..7).map(|_| ValidatorKeyPair::generate()).collect();
        let config = DevnetChainConfig {
            timeslot: Duration::from_secs(10),
            blocks_per_epoch: 10,
        };
        let host = DevnetHost::new(&keys, 3, 1, 1_000, config);

        assert_eq!(host.chain_keys(), vec![ChainKey::Beacon, ChainKey::Shard(0)]);
        assert_eq!(host.role(keys[0].public_key()), ValidatorRole::committee(ChainKey::Beacon));
        assert_eq!(host.role(keys[5].public_key()), ValidatorRole::committee(ChainKey::Shard(0)));

        let pending = host.role(keys[6].public_key());
        assert_eq!(pending.role, CommitteeRole::Pending);
        assert_eq!(pending.voting_chain(), None);

        let stranger = ValidatorKeyPair::generate();
        assert_eq!(host.role(stranger.public_key()).role, CommitteeRole::NotInCommittee);

        let shard = host.devnet_chain(ChainKey::Shard(0)).unwrap();
        assert_eq!(shard.committee().len(), 3);
        assert_eq!(shard.height(), 1);
        assert_eq!(shard.last_block_timestamp(), 1_000);
        assert!(ConsensusHost::chain(&host, ChainKey::Shard(1)).is_none());
    }
}
