//! Per-chain round state machine.
//!
//! One [`RoundProcess`] task runs per chain. It owns the chain's round state,
//! vote book and buffered proposals, and is driven by a single ordered inbox
//! plus a periodic tick:
//!
//! ```text
//! ┌──────────────┐  not ready / min interval not elapsed: stay
//! │   NEWROUND   │  round = floor((now - last_block_ts) / round_timeout)
//! └──────┬───────┘  proposer = (last_proposer + 1 + round) % n
//!        │
//!   ┌────┴─────────────┐
//!   ▼                  ▼
//! ┌──────────┐   ┌──────────┐
//! │ PROPOSE  │   │  LISTEN  │  wait for the round's proposal,
//! │          │   │          │  pre-sign validate it
//! └────┬─────┘   └────┬─────┘
//!      └──────┬───────┘
//!             ▼
//! ┌──────────────┐  vote approve/reject once per local key
//! │   PREPARE    │  Approved: insert block, NEWROUND
//! │              │  Rejected: abandon, NEWROUND
//! └──────────────┘
//! ```
//!
//! On every event the process first checks that its cached round still
//! matches the clock. A process that fell out of its time frame returns to
//! NEWROUND, which is the implicit null vote of a timed out round.

use std::collections::BTreeMap;
use std::sync::Arc;

use meridian_crypto::{BlsPublicKey, DomainTag, ValidatorKeyPair};
use meridian_types::{ChainKey, ConsensusVersion, View};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::byzantine::{ByzantineConfig, ByzantineDetector};
use crate::chain::{BlockRequest, Chain};
use crate::committee::{Committee, MajorityVote};
use crate::message::{
    block_vote_bytes, ConsensusMessage, MessageKind, ProposePayload, VotePayload,
};
use crate::timeout::{now_millis, now_secs, TimeoutConfig};
use crate::types::{Phase, RoundKey, RoundSnapshot};
use crate::vote_set::{VoteBook, VoteRecord};

/// Heights above the next one for which messages are buffered
const FUTURE_HEIGHTS: u64 = 2;
/// Rounds above the clock round for which messages are buffered
const FUTURE_ROUNDS: u64 = 2;

/// Settings of one round process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Chain the process decides blocks for
    pub chain_key: ChainKey,
    /// Finality rule the chain runs under
    pub version: ConsensusVersion,
    /// Round timing
    pub timeouts: TimeoutConfig,
    /// Capacity of the inbox
    pub inbox_capacity: usize,
    /// Equivocation detection
    pub byzantine: ByzantineConfig,
}

impl ProcessConfig {
    /// Defaults for a chain and version
    pub fn new(chain_key: ChainKey, version: ConsensusVersion) -> Self {
        Self {
            chain_key,
            version,
            timeouts: TimeoutConfig::default(),
            inbox_capacity: 1024,
            byzantine: ByzantineConfig::default(),
        }
    }
}

/// Errors delivering to a round process
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// Inbox is at capacity
    #[error("inbox of {0} is full")]
    InboxFull(ChainKey),

    /// Process task has exited
    #[error("process for {0} has stopped")]
    Stopped(ChainKey),
}

/// Input to a round process
#[derive(Debug)]
pub enum ProcessInput {
    /// A propose message
    Propose(ConsensusMessage),
    /// A vote message
    Vote(ConsensusMessage),
    /// Request a state snapshot
    Status(oneshot::Sender<RoundSnapshot>),
}

impl From<ConsensusMessage> for ProcessInput {
    fn from(msg: ConsensusMessage) -> Self {
        match msg.kind {
            MessageKind::Propose => ProcessInput::Propose(msg),
            MessageKind::Vote => ProcessInput::Vote(msg),
        }
    }
}

/// Cloneable sending side of a process inbox
#[derive(Debug, Clone)]
pub struct ProcessInbox {
    chain_key: ChainKey,
    sender: mpsc::Sender<ProcessInput>,
}

impl ProcessInbox {
    /// Queue an input without waiting
    pub fn try_deliver(&self, input: impl Into<ProcessInput>) -> Result<(), ProcessError> {
        self.sender.try_send(input.into()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => ProcessError::InboxFull(self.chain_key),
            mpsc::error::TrySendError::Closed(_) => ProcessError::Stopped(self.chain_key),
        })
    }

    /// Ask the process for a snapshot of its state
    pub async fn status(&self) -> Result<RoundSnapshot, ProcessError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProcessInput::Status(tx))
            .await
            .map_err(|_| ProcessError::Stopped(self.chain_key))?;
        rx.await.map_err(|_| ProcessError::Stopped(self.chain_key))
    }
}

/// Handle to a running round process
#[derive(Debug)]
pub struct ProcessHandle {
    chain_key: ChainKey,
    version: ConsensusVersion,
    validators: Vec<BlsPublicKey>,
    inbox: ProcessInbox,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Chain of the process
    pub fn chain_key(&self) -> ChainKey {
        self.chain_key
    }

    /// Finality rule of the process
    pub fn version(&self) -> ConsensusVersion {
        self.version
    }

    /// Validator keys hosted by the process
    pub fn validators(&self) -> &[BlsPublicKey] {
        &self.validators
    }

    /// Sending side of the inbox
    pub fn inbox(&self) -> ProcessInbox {
        self.inbox.clone()
    }

    /// Queue an input without waiting
    pub fn try_deliver(&self, input: impl Into<ProcessInput>) -> Result<(), ProcessError> {
        self.inbox.try_deliver(input)
    }

    /// Snapshot of the process state
    pub async fn status(&self) -> Result<RoundSnapshot, ProcessError> {
        self.inbox.status().await
    }

    /// Whether the task is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop the task and wait for it to exit
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(chain = %self.chain_key, error = %err, "Round process panicked");
            }
        }
    }
}

#[derive(Debug, Clone)]
struct BufferedProposal {
    view: Arc<View>,
    sender: BlsPublicKey,
}

/// Round state machine of one chain
pub struct RoundProcess {
    config: ProcessConfig,
    chain: Arc<dyn Chain>,
    keys: Vec<ValidatorKeyPair>,
    network_tx: mpsc::Sender<ConsensusMessage>,
    block_vote_domain: DomainTag,

    phase: Phase,
    next_height: u64,
    round: u64,
    committee: Committee,
    /// Committee index and local key index of this round's proposer
    local_proposer: Option<(usize, usize)>,
    last_finished: Option<RoundKey>,
    active: Option<Arc<View>>,
    active_valid: bool,
    proposals: BTreeMap<RoundKey, BufferedProposal>,
    votes: VoteBook,
    /// Earliest produced valid block seen for `next_height`
    reproposal: Option<Arc<View>>,
    detector: Option<ByzantineDetector>,
}

impl RoundProcess {
    /// Create a process for `chain` hosting `keys`
    pub fn new(
        config: ProcessConfig,
        chain: Arc<dyn Chain>,
        keys: Vec<ValidatorKeyPair>,
        network_tx: mpsc::Sender<ConsensusMessage>,
    ) -> Self {
        let detector = (config.version == ConsensusVersion::MultiView && config.byzantine.enabled)
            .then(|| ByzantineDetector::new(config.byzantine.blacklist_ttl));
        let block_vote_domain = DomainTag::new_block_vote(config.chain_key.to_string());
        Self {
            config,
            chain,
            keys,
            network_tx,
            block_vote_domain,
            phase: Phase::NewRound,
            next_height: 0,
            round: 0,
            committee: Committee::default(),
            local_proposer: None,
            last_finished: None,
            active: None,
            active_valid: false,
            proposals: BTreeMap::new(),
            votes: VoteBook::new(),
            reproposal: None,
            detector,
        }
    }

    /// Spawn the process task
    pub fn spawn(self) -> ProcessHandle {
        let (inbox_tx, inbox_rx) = mpsc::channel(self.config.inbox_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let chain_key = self.config.chain_key;
        let version = self.config.version;
        let validators = self.keys.iter().map(|k| k.public_key().clone()).collect();

        let task = tokio::spawn(self.run(inbox_rx, shutdown_rx));

        ProcessHandle {
            chain_key,
            version,
            validators,
            inbox: ProcessInbox {
                chain_key,
                sender: inbox_tx,
            },
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        mut inbox: mpsc::Receiver<ProcessInput>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!(
            chain = %self.config.chain_key,
            version = %self.config.version,
            validators = self.keys.len(),
            "Round process started"
        );

        let mut tick = tokio::time::interval(self.config.timeouts.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                input = inbox.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
                _ = tick.tick() => {}
            }
            self.step().await;
        }

        info!(chain = %self.config.chain_key, "Round process stopped");
    }

    fn handle_input(&mut self, input: ProcessInput) {
        match input {
            ProcessInput::Propose(msg) => self.on_propose(msg),
            ProcessInput::Vote(msg) => self.on_vote(msg),
            ProcessInput::Status(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            chain: self.config.chain_key,
            version: self.config.version,
            phase: self.phase,
            next_height: self.next_height,
            round: self.round,
            validators: self.keys.iter().map(|k| k.public_hex().to_string()).collect(),
            active_block: self.active.as_ref().map(|view| view.hash()),
            vote_rounds: self.votes.len(),
            buffered_proposals: self.proposals.len(),
        }
    }

    fn round_key(&self) -> RoundKey {
        RoundKey::new(self.next_height, self.round)
    }

    fn transition(&mut self, to: Phase) {
        if self.phase == to {
            return;
        }
        debug_assert!(self.phase.can_transition_to(to), "{} -> {}", self.phase, to);
        debug!(
            chain = %self.config.chain_key,
            round_key = %self.round_key(),
            from = %self.phase,
            to = %to,
            "Phase transition"
        );
        self.phase = to;
    }

    /// Run every phase handler whose phase is reached
    async fn step(&mut self) {
        let now_ms = now_millis();

        if self.phase != Phase::NewRound && !self.in_time_frame(now_ms) {
            debug!(
                chain = %self.config.chain_key,
                round_key = %self.round_key(),
                phase = %self.phase,
                "Round left its time frame"
            );
            self.transition(Phase::NewRound);
        }

        if self.phase == Phase::NewRound {
            self.new_round(now_ms);
        }
        if self.phase == Phase::Propose {
            self.propose().await;
        }
        if self.phase == Phase::Listen {
            self.listen().await;
        }
        if self.phase == Phase::Prepare {
            self.prepare().await;
        }
    }

    fn in_time_frame(&self, now_ms: i64) -> bool {
        let last_ts = self.chain.last_block_timestamp();
        self.chain.height() + 1 == self.next_height
            && self.config.timeouts.round_at(last_ts, now_ms) == self.round
    }

    fn new_round(&mut self, now_ms: i64) {
        if !self.chain.is_ready() {
            trace!(chain = %self.config.chain_key, "Chain not ready");
            return;
        }

        let next_height = self.chain.height() + 1;
        if next_height != self.next_height {
            self.enter_height(next_height);
        }

        let last_ts = self.chain.last_block_timestamp();
        if !self.config.timeouts.min_interval_elapsed(last_ts, now_ms) {
            return;
        }

        let round = self.config.timeouts.round_at(last_ts, now_ms);
        let key = RoundKey::new(next_height, round);
        if self.last_finished.map(|done| key <= done).unwrap_or(false) {
            return;
        }

        self.round = round;
        self.active = None;
        self.active_valid = false;
        self.votes.prune_before(key);
        self.proposals = self.proposals.split_off(&key);
        self.committee = self.chain.committee();

        let last_proposer = self.chain.last_proposer_index();
        self.local_proposer = self
            .committee
            .proposer(last_proposer, round)
            .and_then(|(index, pubkey)| {
                self.keys
                    .iter()
                    .position(|k| k.public_key() == pubkey)
                    .map(|local| (index, local))
            });

        debug!(
            chain = %self.config.chain_key,
            round_key = %key,
            committee = self.committee.len(),
            proposer = self.local_proposer.is_some(),
            "Entering round"
        );

        if self.local_proposer.is_some() {
            self.transition(Phase::Propose);
        } else {
            self.transition(Phase::Listen);
        }
    }

    fn enter_height(&mut self, next_height: u64) {
        trace!(chain = %self.config.chain_key, next_height, "New height");
        self.next_height = next_height;
        self.round = 0;
        let first = RoundKey::new(next_height, 0);
        self.votes.prune_before(first);
        self.proposals = self.proposals.split_off(&first);
        if self
            .reproposal
            .as_ref()
            .map(|view| view.height() != next_height)
            .unwrap_or(false)
        {
            self.reproposal = None;
        }

        if let (Some(detector), Some(final_view)) = (self.detector.as_mut(), self.chain.final_view()) {
            let timeslot = self.config.timeouts.timeslot_of(final_view.propose_time());
            detector.prune(final_view.height(), timeslot, now_secs());
        }
    }

    fn finish_round(&mut self) {
        self.last_finished = Some(self.round_key());
        self.active = None;
        self.active_valid = false;
        self.transition(Phase::NewRound);
    }

    fn note_candidate(&mut self, view: &Arc<View>) {
        if view.height() != self.next_height {
            return;
        }
        let earlier = match &self.reproposal {
            Some(current) => view.produce_time() < current.produce_time(),
            None => true,
        };
        if earlier {
            self.reproposal = Some(view.clone());
        }
    }

    async fn propose(&mut self) {
        let Some((proposer_index, local)) = self.local_proposer else {
            self.transition(Phase::Listen);
            return;
        };
        let key = self.round_key();

        let repropose = match self.config.version {
            ConsensusVersion::MultiView => self.reproposal.clone(),
            ConsensusVersion::Legacy => None,
        };
        let request = BlockRequest {
            version: self.config.version,
            round: self.round,
            proposer_index,
            propose_time: now_secs(),
            repropose,
        };

        let view = match self.chain.create_new_block(request).await {
            Ok(view) => Arc::new(view),
            Err(err) => {
                warn!(chain = %self.config.chain_key, round_key = %key, error = %err, "Failed to create block");
                self.finish_round();
                return;
            }
        };

        let payload = ProposePayload {
            block: view.block().clone(),
        };
        let signer = &self.keys[local];
        match ConsensusMessage::propose(self.config.chain_key, key, &payload, signer, now_secs()) {
            Ok(msg) => {
                info!(
                    chain = %self.config.chain_key,
                    round_key = %key,
                    block_hash = %view.hash().short(),
                    "Proposing block"
                );
                self.broadcast(msg).await;
            }
            Err(err) => {
                warn!(chain = %self.config.chain_key, error = %err, "Failed to encode proposal");
                self.finish_round();
                return;
            }
        }

        self.active_valid = self.validate(&view).await;
        if self.active_valid {
            self.note_candidate(&view);
        }
        self.active = Some(view);
        self.transition(Phase::Prepare);
    }

    async fn listen(&mut self) {
        let key = self.round_key();
        let Some(proposal) = self.proposals.get(&key).cloned() else {
            return;
        };

        let expected = self
            .committee
            .proposer(self.chain.last_proposer_index(), self.round)
            .map(|(_, pubkey)| pubkey.clone());
        if expected.as_ref() != Some(&proposal.sender) {
            debug!(chain = %self.config.chain_key, round_key = %key, "Dropping proposal from unexpected proposer");
            self.proposals.remove(&key);
            return;
        }

        self.active_valid = self.validate(&proposal.view).await;
        if self.active_valid {
            self.note_candidate(&proposal.view);
        }
        self.active = Some(proposal.view);
        self.transition(Phase::Prepare);
    }

    async fn validate(&self, view: &View) -> bool {
        match self.chain.validate_pre_sign_block(view).await {
            Ok(()) => true,
            Err(err) => {
                debug!(
                    chain = %self.config.chain_key,
                    block_hash = %view.hash().short(),
                    error = %err,
                    "Block failed pre-sign validation"
                );
                false
            }
        }
    }

    async fn prepare(&mut self) {
        let Some(active) = self.active.clone() else {
            self.transition(Phase::NewRound);
            return;
        };
        let key = self.round_key();
        let now = now_secs();

        for local in 0..self.keys.len() {
            let pubkey = self.keys[local].public_key().clone();
            if !self.committee.contains(&pubkey) {
                continue;
            }
            if self.votes.get(&key).map(|set| set.has_voted(&pubkey)).unwrap_or(false) {
                continue;
            }

            let mut payload = VotePayload {
                block_hash: active.hash(),
                height: active.height(),
                propose_timeslot: self.config.timeouts.timeslot_of(active.propose_time()),
                produce_timeslot: self.config.timeouts.timeslot_of(active.produce_time()),
                approve: self.active_valid,
                block_signature: self.keys[local]
                    .sign_with_domain(&block_vote_bytes(&active.hash(), self.active_valid), &self.block_vote_domain),
            };
            if payload.approve {
                if let Some(detector) = &self.detector {
                    if let Err(err) = detector.check(&pubkey, &payload, now) {
                        debug!(
                            chain = %self.config.chain_key,
                            round_key = %key,
                            error = %err,
                            "Voting reject to avoid equivocation"
                        );
                        payload.approve = false;
                        payload.block_signature = self.keys[local]
                            .sign_with_domain(&block_vote_bytes(&active.hash(), false), &self.block_vote_domain);
                    }
                }
            }

            match ConsensusMessage::vote(self.config.chain_key, key, &payload, &self.keys[local], now) {
                Ok(msg) => {
                    trace!(
                        chain = %self.config.chain_key,
                        round_key = %key,
                        approve = payload.approve,
                        "Sending vote"
                    );
                    self.broadcast(msg).await;
                }
                Err(err) => {
                    warn!(chain = %self.config.chain_key, error = %err, "Failed to encode vote");
                    continue;
                }
            }
            self.record_vote(key, pubkey, payload, now);
        }

        let outcome = match self.votes.get(&key) {
            Some(set) => set.tally(&active.hash(), self.committee.len()),
            None => MajorityVote::Pending,
        };
        match outcome {
            MajorityVote::Approved => self.commit(key, active).await,
            MajorityVote::Rejected => {
                info!(
                    chain = %self.config.chain_key,
                    round_key = %key,
                    block_hash = %active.hash().short(),
                    "Block rejected"
                );
                self.finish_round();
            }
            MajorityVote::Pending => {}
        }
    }

    async fn commit(&mut self, key: RoundKey, active: Arc<View>) {
        let certificate = self.votes.get(&key).and_then(|set| set.certificate_for(&active.hash()));
        let Some(certificate) = certificate else {
            warn!(chain = %self.config.chain_key, round_key = %key, "Failed to aggregate approvals");
            self.finish_round();
            return;
        };

        let signers = certificate.signers.len();
        match self.chain.insert_block(active.clone(), certificate, self.active_valid).await {
            Ok(()) => info!(
                chain = %self.config.chain_key,
                height = active.height(),
                round = key.round,
                block_hash = %active.hash().short(),
                signers,
                "Committed block"
            ),
            Err(err) => warn!(
                chain = %self.config.chain_key,
                round_key = %key,
                error = %err,
                "Failed to insert block"
            ),
        }
        self.finish_round();
    }

    async fn broadcast(&self, msg: ConsensusMessage) {
        if self.network_tx.send(msg).await.is_err() {
            warn!(chain = %self.config.chain_key, "Network channel closed");
        }
    }

    fn is_stale(&self, key: RoundKey) -> bool {
        key.height <= self.chain.height()
            || (key.height == self.next_height && key.round < self.round)
    }

    /// Whether `key` lies beyond the heights and rounds worth buffering.
    ///
    /// Rounds of the next height are bounded by the local clock; later
    /// heights have no clock reference yet and only admit their first rounds.
    fn is_too_far_ahead(&self, key: RoundKey) -> bool {
        let next_height = self.chain.height() + 1;
        if key.height > next_height + FUTURE_HEIGHTS {
            return true;
        }
        let clock_round = if key.height == next_height {
            self.config
                .timeouts
                .round_at(self.chain.last_block_timestamp(), now_millis())
        } else {
            0
        };
        key.round > clock_round + FUTURE_ROUNDS
    }

    fn admits(&self, key: RoundKey, kind: &str) -> bool {
        if self.is_stale(key) {
            trace!(chain = %self.config.chain_key, round_key = %key, kind, "Dropping stale message");
            return false;
        }
        if self.is_too_far_ahead(key) {
            debug!(chain = %self.config.chain_key, round_key = %key, kind, "Dropping message too far ahead");
            return false;
        }
        true
    }

    fn on_propose(&mut self, msg: ConsensusMessage) {
        let sender = match msg.verify() {
            Ok(sender) => sender,
            Err(err) => {
                warn!(chain = %self.config.chain_key, error = %err, "Dropping proposal");
                return;
            }
        };
        let key = match msg.parse_round_key() {
            Ok(key) => key,
            Err(err) => {
                debug!(chain = %self.config.chain_key, error = %err, "Dropping proposal");
                return;
            }
        };
        if !self.admits(key, "propose") {
            return;
        }
        let view = match msg.propose_payload() {
            Ok(payload) => View::new(payload.block),
            Err(err) => {
                debug!(chain = %self.config.chain_key, error = %err, "Dropping proposal");
                return;
            }
        };

        if view.chain_key() != self.config.chain_key
            || view.height() != key.height
            || view.round() != key.round
        {
            debug!(
                chain = %self.config.chain_key,
                round_key = %key,
                block_hash = %view.hash().short(),
                "Dropping proposal for another position"
            );
            return;
        }
        if let Err(err) = view.block().validate_basic() {
            debug!(chain = %self.config.chain_key, error = %err, "Dropping malformed proposal");
            return;
        }
        if self.chain.proposer_index(&sender) != Some(view.proposer_index() as usize) {
            debug!(chain = %self.config.chain_key, round_key = %key, "Dropping proposal signed by another validator");
            return;
        }

        trace!(
            chain = %self.config.chain_key,
            round_key = %key,
            block_hash = %view.hash().short(),
            "Buffered proposal"
        );
        self.proposals.entry(key).or_insert(BufferedProposal {
            view: Arc::new(view),
            sender,
        });
    }

    fn on_vote(&mut self, msg: ConsensusMessage) {
        let sender = match msg.verify() {
            Ok(sender) => sender,
            Err(err) => {
                warn!(chain = %self.config.chain_key, error = %err, "Dropping vote");
                return;
            }
        };
        let key = match msg.parse_round_key() {
            Ok(key) => key,
            Err(err) => {
                debug!(chain = %self.config.chain_key, error = %err, "Dropping vote");
                return;
            }
        };
        if !self.admits(key, "vote") {
            return;
        }
        let payload = match msg.vote_payload() {
            Ok(payload) => payload,
            Err(err) => {
                debug!(chain = %self.config.chain_key, error = %err, "Dropping vote");
                return;
            }
        };
        if payload.height != key.height {
            debug!(chain = %self.config.chain_key, round_key = %key, "Dropping vote for another height");
            return;
        }

        self.record_vote(key, sender, payload, now_secs());
    }

    fn record_vote(&mut self, key: RoundKey, sender: BlsPublicKey, payload: VotePayload, now: i64) {
        let committee = self.chain.committee();
        if !committee.contains(&sender) {
            debug!(
                chain = %self.config.chain_key,
                round_key = %key,
                sender = %sender.to_hex(),
                "Dropping vote from non-committee validator"
            );
            return;
        }

        if payload.approve {
            if let Some(detector) = self.detector.as_mut() {
                if let Err(err) = detector.validate(&sender, &payload, now) {
                    debug!(chain = %self.config.chain_key, round_key = %key, error = %err, "Refused vote");
                    return;
                }
            }
        }

        let record = VoteRecord {
            validator: sender,
            committee_index: 0,
            block_hash: payload.block_hash,
            approve: payload.approve,
            signature: payload.block_signature,
            received_at: now,
        };
        if let Err(err) = self
            .votes
            .add_vote(key, record, &committee, &self.block_vote_domain)
        {
            debug!(chain = %self.config.chain_key, round_key = %key, error = %err, "Dropping vote");
        }
    }
}
