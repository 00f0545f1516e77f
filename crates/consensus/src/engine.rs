//! Consensus engine.
//!
//! The engine owns one [`RoundProcess`] per chain the local validators sit
//! in the committee of. A watch loop periodically reads every local key's
//! role from the [`ConsensusHost`], groups committee keys by chain and makes
//! sure each group runs in a process of the right consensus version:
//!
//! - a chain without local committee keys has its process stopped
//! - a process whose version or key set no longer matches is replaced
//! - the version is derived from the chain epoch and the cutover epoch
//!
//! Inbound wire messages are routed to the process of their chain key.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use meridian_crypto::{BlsPublicKey, ValidatorKeyPair};
use meridian_types::{ChainKey, ConsensusVersion};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::byzantine::ByzantineConfig;
use crate::chain::Chain;
use crate::message::ConsensusMessage;
use crate::process::{ProcessConfig, ProcessError, ProcessHandle, ProcessInput, RoundProcess};
use crate::timeout::TimeoutConfig;
use crate::types::RoundSnapshot;

/// Errors that can occur during engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Host does not know the chain
    #[error("unknown chain {0}")]
    UnknownChain(ChainKey),

    /// No local key is in the chain's committee
    #[error("no local committee keys for {0}")]
    NoValidatorKeys(ChainKey),

    /// No process is running for the chain
    #[error("consensus not started for {0}")]
    NotStarted(ChainKey),

    /// Delivering to the process failed
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Committee status of a validator key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommitteeRole {
    /// Not selected for any committee
    #[default]
    NotInCommittee,
    /// Selected for a future epoch
    Pending,
    /// Member of a running committee
    Committee,
}

/// Role of a validator key as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidatorRole {
    /// Committee status
    pub role: CommitteeRole,
    /// Chain the key is assigned to
    pub chain: Option<ChainKey>,
}

impl ValidatorRole {
    /// Committee member of `chain`
    pub fn committee(chain: ChainKey) -> Self {
        Self {
            role: CommitteeRole::Committee,
            chain: Some(chain),
        }
    }

    /// Selected for `chain` in a later epoch
    pub fn pending(chain: ChainKey) -> Self {
        Self {
            role: CommitteeRole::Pending,
            chain: Some(chain),
        }
    }

    /// Chain this role votes on, if any
    pub fn voting_chain(&self) -> Option<ChainKey> {
        match self.role {
            CommitteeRole::Committee => self.chain,
            _ => None,
        }
    }
}

/// Node-side collaborator of the engine
pub trait ConsensusHost: Send + Sync {
    /// Current role of a local validator key
    fn role(&self, pubkey: &BlsPublicKey) -> ValidatorRole;

    /// Chain collaborator for a chain key
    fn chain(&self, key: ChainKey) -> Option<Arc<dyn Chain>>;
}

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the role watch loop
    pub watch_interval: Duration,
    /// First epoch running the multi-view finality rule
    pub multiview_epoch: u64,
    /// Round timing of every process
    pub timeouts: TimeoutConfig,
    /// Inbox capacity of every process
    pub inbox_capacity: usize,
    /// Equivocation detection of multi-view processes
    pub byzantine: ByzantineConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watch_interval: Duration::from_secs(3),
            multiview_epoch: 1,
            timeouts: TimeoutConfig::default(),
            inbox_capacity: 1024,
            byzantine: ByzantineConfig::default(),
        }
    }
}

struct WatchTask {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

struct EngineInner {
    config: EngineConfig,
    host: Arc<dyn ConsensusHost>,
    keys: Vec<ValidatorKeyPair>,
    network_tx: mpsc::Sender<ConsensusMessage>,
    processes: RwLock<HashMap<ChainKey, ProcessHandle>>,
    watch: Mutex<Option<WatchTask>>,
}

/// Multi-chain consensus engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine for the local validator `keys`.
    ///
    /// Outbound consensus messages of every process are sent on `network_tx`.
    pub fn new(
        config: EngineConfig,
        host: Arc<dyn ConsensusHost>,
        keys: Vec<ValidatorKeyPair>,
        network_tx: mpsc::Sender<ConsensusMessage>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                host,
                keys,
                network_tx,
                processes: RwLock::new(HashMap::new()),
                watch: Mutex::new(None),
            }),
        }
    }

    /// Start the watch loop. Calling this on a running engine does nothing.
    pub fn start(&self) {
        let mut watch = self.inner.watch.lock();
        if watch.is_some() {
            return;
        }

        info!(
            validators = self.inner.keys.len(),
            multiview_epoch = self.inner.config.multiview_epoch,
            "Starting consensus engine"
        );

        let (shutdown, mut shutdown_rx) = broadcast::channel(1);
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.config.watch_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => inner.sync_processes().await,
                }
            }
            debug!("Engine watch loop exited");
        });

        *watch = Some(WatchTask { shutdown, task });
    }

    /// Stop the watch loop and every process, waiting for all of them to
    /// exit. Calling this on a stopped engine does nothing.
    pub async fn stop(&self) {
        let watch = self.inner.watch.lock().take();
        if let Some(watch) = watch {
            info!("Stopping consensus engine");
            let _ = watch.shutdown.send(());
            if let Err(err) = watch.task.await {
                warn!(error = %err, "Engine watch loop panicked");
            }
        }

        let handles: Vec<ProcessHandle> = self
            .inner
            .processes
            .write()
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            handle.stop().await;
        }
        info!("Consensus engine stopped");
    }

    /// Whether the watch loop is running
    pub fn is_running(&self) -> bool {
        self.inner.watch.lock().is_some()
    }

    /// Reconcile running processes with the current roles now
    pub async fn sync_processes(&self) {
        self.inner.sync_processes().await;
    }

    /// Start the process of one chain with the local keys assigned to it
    pub async fn start_chain(&self, chain_key: ChainKey) -> Result<(), EngineError> {
        let keys = self.inner.committee_keys().remove(&chain_key).unwrap_or_default();
        if keys.is_empty() {
            return Err(EngineError::NoValidatorKeys(chain_key));
        }
        self.inner.ensure_process(chain_key, keys).await
    }

    /// Stop the process of one chain
    pub async fn stop_chain(&self, chain_key: ChainKey) -> Result<(), EngineError> {
        let handle = self.inner.processes.write().remove(&chain_key);
        match handle {
            Some(handle) => {
                info!(chain = %chain_key, "Stopping round process");
                handle.stop().await;
                Ok(())
            }
            None => Err(EngineError::NotStarted(chain_key)),
        }
    }

    /// Whether a process is running for the chain
    pub fn is_started(&self, chain_key: ChainKey) -> bool {
        self.inner
            .processes
            .read()
            .get(&chain_key)
            .map(|h| h.is_running())
            .unwrap_or(false)
    }

    /// Chains with a process, in key order
    pub fn chains(&self) -> Vec<ChainKey> {
        let mut chains: Vec<ChainKey> = self.inner.processes.read().keys().copied().collect();
        chains.sort();
        chains
    }

    /// Version of a chain's running process
    pub fn version(&self, chain_key: ChainKey) -> Option<ConsensusVersion> {
        self.inner.processes.read().get(&chain_key).map(|h| h.version())
    }

    /// Snapshot of a chain's round state
    pub async fn status(&self, chain_key: ChainKey) -> Result<RoundSnapshot, EngineError> {
        let inbox = self.inner.processes.read().get(&chain_key).map(|h| h.inbox());
        match inbox {
            Some(inbox) => Ok(inbox.status().await?),
            None => Err(EngineError::NotStarted(chain_key)),
        }
    }

    /// Route an inbound message to its chain's process
    pub fn on_message(&self, msg: ConsensusMessage) -> Result<(), EngineError> {
        let chain_key = msg.chain_key;
        self.deliver(chain_key, ProcessInput::from(msg))
    }

    /// Route an inbound propose message
    pub fn receive_propose_message(&self, msg: ConsensusMessage) -> Result<(), EngineError> {
        let chain_key = msg.chain_key;
        self.deliver(chain_key, ProcessInput::Propose(msg))
    }

    /// Route an inbound vote message
    pub fn receive_vote_message(&self, msg: ConsensusMessage) -> Result<(), EngineError> {
        let chain_key = msg.chain_key;
        self.deliver(chain_key, ProcessInput::Vote(msg))
    }

    fn deliver(&self, chain_key: ChainKey, input: ProcessInput) -> Result<(), EngineError> {
        let processes = self.inner.processes.read();
        let handle = processes
            .get(&chain_key)
            .ok_or(EngineError::NotStarted(chain_key))?;
        Ok(handle.try_deliver(input)?)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("validators", &self.inner.keys.len())
            .field("chains", &self.chains())
            .finish()
    }
}

impl EngineInner {
    /// Local keys grouped by the chain they vote on
    fn committee_keys(&self) -> BTreeMap<ChainKey, Vec<ValidatorKeyPair>> {
        let mut groups: BTreeMap<ChainKey, Vec<ValidatorKeyPair>> = BTreeMap::new();
        for key in &self.keys {
            if let Some(chain) = self.host.role(key.public_key()).voting_chain() {
                groups.entry(chain).or_default().push(key.clone());
            }
        }
        groups
    }

    async fn sync_processes(&self) {
        let groups = self.committee_keys();

        let retired: Vec<ProcessHandle> = {
            let mut processes = self.processes.write();
            let gone: Vec<ChainKey> = processes
                .keys()
                .filter(|key| !groups.contains_key(key))
                .copied()
                .collect();
            gone.into_iter()
                .filter_map(|key| processes.remove(&key))
                .collect()
        };
        for handle in retired {
            info!(chain = %handle.chain_key(), "No local committee keys, stopping round process");
            handle.stop().await;
        }

        for (chain_key, keys) in groups {
            if let Err(err) = self.ensure_process(chain_key, keys).await {
                warn!(chain = %chain_key, error = %err, "Failed to start round process");
            }
        }
    }

    /// Make sure `chain_key` runs a process of the current version hosting
    /// exactly `keys`
    async fn ensure_process(
        &self,
        chain_key: ChainKey,
        keys: Vec<ValidatorKeyPair>,
    ) -> Result<(), EngineError> {
        let chain = self
            .host
            .chain(chain_key)
            .ok_or(EngineError::UnknownChain(chain_key))?;
        let version = ConsensusVersion::for_epoch(chain.epoch(), self.config.multiview_epoch);
        let pubkeys: Vec<BlsPublicKey> = keys.iter().map(|k| k.public_key().clone()).collect();

        let current = {
            let processes = self.processes.read();
            processes
                .get(&chain_key)
                .map(|h| serves(h, version, &pubkeys))
        };
        match current {
            Some(true) => return Ok(()),
            Some(false) => {
                let old = self.processes.write().remove(&chain_key);
                if let Some(old) = old {
                    info!(
                        chain = %chain_key,
                        from = %old.version(),
                        to = %version,
                        "Replacing round process"
                    );
                    old.stop().await;
                }
            }
            None => {}
        }

        let config = ProcessConfig {
            chain_key,
            version,
            timeouts: self.config.timeouts.clone(),
            inbox_capacity: self.config.inbox_capacity,
            byzantine: self.config.byzantine.clone(),
        };
        info!(chain = %chain_key, version = %version, validators = keys.len(), "Starting round process");
        let handle = RoundProcess::new(config, chain, keys, self.network_tx.clone()).spawn();

        // another caller may have filled the slot since the check above
        let spare = match self.processes.write().entry(chain_key) {
            Entry::Vacant(slot) => {
                slot.insert(handle);
                None
            }
            Entry::Occupied(slot) if serves(slot.get(), version, &pubkeys) => Some(handle),
            Entry::Occupied(mut slot) => Some(slot.insert(handle)),
        };
        if let Some(spare) = spare {
            debug!(chain = %chain_key, "Stopping superseded round process");
            spare.stop().await;
        }
        Ok(())
    }
}

/// Whether `handle` is a live process of `version` hosting exactly `pubkeys`
fn serves(handle: &ProcessHandle, version: ConsensusVersion, pubkeys: &[BlsPublicKey]) -> bool {
    handle.version() == version && handle.validators() == pubkeys && handle.is_running()
}
