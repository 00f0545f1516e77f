//! Equivocation detection for multi-view chains.
//!
//! Two voting patterns are treated as equivocation and get the voter
//! blacklisted:
//!
//! 1. Two votes in the same propose timeslot for different blocks.
//! 2. A vote at a height for a block produced in a later timeslot than a
//!    block the validator already voted for at that height. Honest proposers
//!    re-propose the earliest produced block of a height, so a later produce
//!    timeslot means a competing block.
//!
//! Receiving the same vote again is not equivocation.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use meridian_crypto::BlsPublicKey;
use meridian_types::H256;
use tracing::{debug, warn};

use crate::message::VotePayload;

/// Default time a detected equivocator stays blacklisted
pub const DEFAULT_BLACKLIST_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Detector settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByzantineConfig {
    /// Run the detector on multi-view chains
    pub enabled: bool,
    /// How long a detected equivocator stays blacklisted
    pub blacklist_ttl: Duration,
}

impl Default for ByzantineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blacklist_ttl: DEFAULT_BLACKLIST_TTL,
        }
    }
}

/// Why a vote was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ByzantineError {
    /// Voter is blacklisted
    #[error("validator blacklisted until {until}: {reason}")]
    Blacklisted {
        /// Unix seconds when the entry expires
        until: i64,
        /// Original offence
        reason: String,
    },

    /// Two different blocks voted in one propose timeslot
    #[error("duplicate vote in timeslot {timeslot}: {first} then {second}")]
    DuplicateVoteInTimeslot {
        /// Propose timeslot
        timeslot: i64,
        /// Block voted first
        first: H256,
        /// Conflicting block
        second: H256,
    },

    /// Vote for a block produced later than one already voted at the height
    #[error("vote at height {height} for produce timeslot {timeslot}, already voted {smallest}")]
    VoteForHigherTimeslot {
        /// Block height
        height: u64,
        /// Produce timeslot of the refused vote
        timeslot: i64,
        /// Smallest produce timeslot voted at this height
        smallest: i64,
    },
}

#[derive(Debug, Clone)]
struct BlacklistEntry {
    reason: String,
    until: i64,
}

#[derive(Debug, Clone, Copy)]
struct CastVote {
    block_hash: H256,
}

/// Per-chain equivocation detector
#[derive(Debug)]
pub struct ByzantineDetector {
    ttl: Duration,
    blacklist: HashMap<BlsPublicKey, BlacklistEntry>,
    vote_in_timeslot: HashMap<BlsPublicKey, BTreeMap<i64, CastVote>>,
    smallest_produce_timeslot: HashMap<BlsPublicKey, BTreeMap<u64, i64>>,
}

impl Default for ByzantineDetector {
    fn default() -> Self {
        Self::new(DEFAULT_BLACKLIST_TTL)
    }
}

impl ByzantineDetector {
    /// Create a detector whose blacklist entries last `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            blacklist: HashMap::new(),
            vote_in_timeslot: HashMap::new(),
            smallest_produce_timeslot: HashMap::new(),
        }
    }

    /// Check a vote without recording it
    pub fn check(&self, voter: &BlsPublicKey, vote: &VotePayload, now: i64) -> Result<(), ByzantineError> {
        if let Some(entry) = self.blacklist.get(voter) {
            if now <= entry.until {
                return Err(ByzantineError::Blacklisted {
                    until: entry.until,
                    reason: entry.reason.clone(),
                });
            }
        }

        if let Some(cast) = self
            .vote_in_timeslot
            .get(voter)
            .and_then(|slots| slots.get(&vote.propose_timeslot))
        {
            if cast.block_hash != vote.block_hash {
                return Err(ByzantineError::DuplicateVoteInTimeslot {
                    timeslot: vote.propose_timeslot,
                    first: cast.block_hash,
                    second: vote.block_hash,
                });
            }
        }

        if let Some(&smallest) = self
            .smallest_produce_timeslot
            .get(voter)
            .and_then(|heights| heights.get(&vote.height))
        {
            if vote.produce_timeslot > smallest {
                return Err(ByzantineError::VoteForHigherTimeslot {
                    height: vote.height,
                    timeslot: vote.produce_timeslot,
                    smallest,
                });
            }
        }

        Ok(())
    }

    /// Check a vote and record it.
    ///
    /// A refused vote blacklists its sender (unless it was refused because
    /// the sender already is blacklisted).
    pub fn validate(&mut self, voter: &BlsPublicKey, vote: &VotePayload, now: i64) -> Result<(), ByzantineError> {
        if let Some(entry) = self.blacklist.get(voter) {
            if now > entry.until {
                debug!(validator = %short_key(voter), "Blacklist entry expired");
                self.blacklist.remove(voter);
            }
        }

        match self.check(voter, vote, now) {
            Ok(()) => {
                self.record(voter, vote);
                Ok(())
            }
            Err(err @ ByzantineError::Blacklisted { .. }) => Err(err),
            Err(err) => {
                warn!(
                    validator = %short_key(voter),
                    height = vote.height,
                    error = %err,
                    "Blacklisting validator"
                );
                let until = now.saturating_add(self.ttl.as_secs() as i64);
                self.blacklist.insert(
                    voter.clone(),
                    BlacklistEntry {
                        reason: err.to_string(),
                        until,
                    },
                );
                Err(err)
            }
        }
    }

    fn record(&mut self, voter: &BlsPublicKey, vote: &VotePayload) {
        self.vote_in_timeslot
            .entry(voter.clone())
            .or_default()
            .insert(
                vote.propose_timeslot,
                CastVote {
                    block_hash: vote.block_hash,
                },
            );

        let smallest = self
            .smallest_produce_timeslot
            .entry(voter.clone())
            .or_default()
            .entry(vote.height)
            .or_insert(vote.produce_timeslot);
        if vote.produce_timeslot < *smallest {
            *smallest = vote.produce_timeslot;
        }
    }

    /// Forget votes below the final view and expired blacklist entries
    pub fn prune(&mut self, final_height: u64, final_timeslot: i64, now: i64) {
        for slots in self.vote_in_timeslot.values_mut() {
            *slots = slots.split_off(&final_timeslot);
        }
        self.vote_in_timeslot.retain(|_, slots| !slots.is_empty());

        for heights in self.smallest_produce_timeslot.values_mut() {
            *heights = heights.split_off(&final_height);
        }
        self.smallest_produce_timeslot
            .retain(|_, heights| !heights.is_empty());

        self.blacklist.retain(|_, entry| now <= entry.until);
    }

    /// Whether a validator is currently blacklisted
    pub fn is_blacklisted(&self, voter: &BlsPublicKey, now: i64) -> bool {
        self.blacklist
            .get(voter)
            .map(|entry| now <= entry.until)
            .unwrap_or(false)
    }

    /// Number of blacklist entries, expired or not
    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }
}

fn short_key(pk: &BlsPublicKey) -> String {
    let hex = pk.to_hex();
    hex[..hex.len().min(16)].to_string()
}
