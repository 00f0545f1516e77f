//! Vote collection and majority detection.
//!
//! This module handles:
//! - Collecting one vote per validator for a round key
//! - Verifying block-vote signatures using BLS
//! - Counting approvals for the active block against the committee
//! - Aggregating approval signatures into a [`CommitCertificate`]

use std::collections::{BTreeMap, HashMap};

use meridian_crypto::{BlsPublicKey, BlsSignature, DomainTag};
use meridian_types::H256;
use tracing::{debug, trace, warn};

use crate::committee::{Committee, MajorityVote};
use crate::message::{block_vote_bytes, CommitCertificate};
use crate::types::RoundKey;

/// Error types for vote set operations
#[derive(Debug, thiserror::Error)]
pub enum VoteSetError {
    /// Voter is not a committee member
    #[error("vote from non-committee validator {0}")]
    NotInCommittee(String),

    /// Block signature does not verify
    #[error("invalid block signature from validator {0}")]
    InvalidSignature(String),
}

/// One validator's vote in a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    /// Voter
    pub validator: BlsPublicKey,
    /// Voter's committee index
    pub committee_index: usize,
    /// Block voted on
    pub block_hash: H256,
    /// Approve or reject
    pub approve: bool,
    /// Signature over `block_hash || approve`
    pub signature: BlsSignature,
    /// Unix seconds when the vote was received
    pub received_at: i64,
}

/// Votes of a single round key, at most one per validator
#[derive(Debug, Clone)]
pub struct VoteSet {
    round_key: RoundKey,
    votes: HashMap<BlsPublicKey, VoteRecord>,
}

impl VoteSet {
    /// Create an empty vote set
    pub fn new(round_key: RoundKey) -> Self {
        Self {
            round_key,
            votes: HashMap::new(),
        }
    }

    /// Round key of this set
    pub fn round_key(&self) -> RoundKey {
        self.round_key
    }

    /// Add a vote after checking membership and signature.
    ///
    /// A second vote from the same validator replaces the first. Returns
    /// `true` if a previous vote was replaced.
    pub fn add_vote(
        &mut self,
        mut vote: VoteRecord,
        committee: &Committee,
        domain: &DomainTag,
    ) -> Result<bool, VoteSetError> {
        let index = committee
            .index_of(&vote.validator)
            .ok_or_else(|| VoteSetError::NotInCommittee(vote.validator.to_hex()))?;
        vote.committee_index = index;

        let bytes = block_vote_bytes(&vote.block_hash, vote.approve);
        if !vote.signature.verify_with_domain(&bytes, &vote.validator, domain) {
            warn!(
                round_key = %self.round_key,
                validator = index,
                "Invalid vote signature"
            );
            return Err(VoteSetError::InvalidSignature(vote.validator.to_hex()));
        }

        trace!(
            round_key = %self.round_key,
            validator = index,
            block_hash = %vote.block_hash.short(),
            approve = vote.approve,
            "Adding vote"
        );

        Ok(self.votes.insert(vote.validator.clone(), vote).is_some())
    }

    /// Get a specific vote by validator
    pub fn get_vote(&self, validator: &BlsPublicKey) -> Option<&VoteRecord> {
        self.votes.get(validator)
    }

    /// Check if a validator has voted
    pub fn has_voted(&self, validator: &BlsPublicKey) -> bool {
        self.votes.contains_key(validator)
    }

    /// Get the total number of votes
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Approvals for `block_hash`
    pub fn approvals(&self, block_hash: &H256) -> usize {
        self.votes
            .values()
            .filter(|v| v.approve && v.block_hash == *block_hash)
            .count()
    }

    /// Rejections of any block in this round
    pub fn rejections(&self) -> usize {
        self.votes.values().filter(|v| !v.approve).count()
    }

    /// Majority outcome for `block_hash`
    pub fn tally(&self, block_hash: &H256, committee_size: usize) -> MajorityVote {
        let approvals = self.approvals(block_hash);
        let rejections = self.rejections();
        let outcome = MajorityVote::tally(approvals, rejections, committee_size);
        if outcome != MajorityVote::Pending {
            debug!(
                round_key = %self.round_key,
                block_hash = %block_hash.short(),
                approvals,
                rejections,
                committee_size,
                outcome = ?outcome,
                "Majority reached"
            );
        }
        outcome
    }

    /// Aggregate the approvals of `block_hash` into a commit certificate
    pub fn certificate_for(&self, block_hash: &H256) -> Option<CommitCertificate> {
        let mut approvals: Vec<&VoteRecord> = self
            .votes
            .values()
            .filter(|v| v.approve && v.block_hash == *block_hash)
            .collect();
        if approvals.is_empty() {
            return None;
        }
        approvals.sort_by_key(|v| v.committee_index);

        let signatures: Vec<&BlsSignature> = approvals.iter().map(|v| &v.signature).collect();
        let aggregate_signature = BlsSignature::aggregate(&signatures).ok()?;

        Some(CommitCertificate {
            round_key: self.round_key,
            block_hash: *block_hash,
            signers: approvals.iter().map(|v| v.committee_index).collect(),
            aggregate_signature,
        })
    }
}

/// Vote sets of every round key a chain has seen votes for
#[derive(Debug, Default)]
pub struct VoteBook {
    sets: BTreeMap<RoundKey, VoteSet>,
}

impl VoteBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vote to the set of `round_key`.
    ///
    /// A missing set is created only after the vote passed the membership
    /// and signature checks. Returns `true` if a previous vote was replaced.
    pub fn add_vote(
        &mut self,
        round_key: RoundKey,
        vote: VoteRecord,
        committee: &Committee,
        domain: &DomainTag,
    ) -> Result<bool, VoteSetError> {
        if let Some(set) = self.sets.get_mut(&round_key) {
            return set.add_vote(vote, committee, domain);
        }
        let mut set = VoteSet::new(round_key);
        let replaced = set.add_vote(vote, committee, domain)?;
        self.sets.insert(round_key, set);
        Ok(replaced)
    }

    /// Get the set for a round key
    pub fn get(&self, round_key: &RoundKey) -> Option<&VoteSet> {
        self.sets.get(round_key)
    }

    /// Drop every set whose key sorts before `round_key`
    pub fn prune_before(&mut self, round_key: RoundKey) -> usize {
        let kept = self.sets.split_off(&round_key);
        let removed = self.sets.len();
        self.sets = kept;
        removed
    }

    /// Number of round keys with votes
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether no votes are held
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.sets.clear();
    }
}
