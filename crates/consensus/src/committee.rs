//! Committee model: proposer rotation and majority arithmetic.

use std::sync::Arc;

use meridian_crypto::BlsPublicKey;

/// Outcome of counting the votes of one round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajorityVote {
    /// More than two thirds of the committee approved
    Approved,
    /// More than two thirds of the committee rejected
    Rejected,
    /// Neither side has a majority yet
    Pending,
}

impl MajorityVote {
    /// Classify vote counts against a committee of `committee_size`.
    ///
    /// A side needs strictly more than `2 * committee_size / 3` votes
    /// (integer division); anything short of that is `Pending`.
    pub fn tally(approvals: usize, rejections: usize, committee_size: usize) -> Self {
        let threshold = majority_threshold(committee_size);
        if committee_size == 0 {
            MajorityVote::Pending
        } else if approvals > threshold {
            MajorityVote::Approved
        } else if rejections > threshold {
            MajorityVote::Rejected
        } else {
            MajorityVote::Pending
        }
    }
}

/// `2 * size / 3`; a majority needs strictly more votes than this.
pub fn majority_threshold(committee_size: usize) -> usize {
    2 * committee_size / 3
}

/// Committee index of the proposer for `round` after a block proposed by
/// `last_proposer_index`.
///
/// Returns `None` for an empty committee.
pub fn proposer_index(last_proposer_index: usize, round: u64, committee_size: usize) -> Option<usize> {
    if committee_size == 0 {
        return None;
    }
    let size = committee_size as u64;
    let offset = (last_proposer_index as u64 % size + 1 + round % size) % size;
    Some(offset as usize)
}

/// Ordered validator set of one chain at one epoch.
///
/// Cloning is cheap; members are shared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Committee {
    members: Arc<Vec<BlsPublicKey>>,
}

impl Committee {
    /// Create a committee from its ordered members
    pub fn new(members: Vec<BlsPublicKey>) -> Self {
        Self {
            members: Arc::new(members),
        }
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the committee has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in committee order
    pub fn members(&self) -> &[BlsPublicKey] {
        &self.members
    }

    /// Member at `index`
    pub fn get(&self, index: usize) -> Option<&BlsPublicKey> {
        self.members.get(index)
    }

    /// Committee index of `pubkey`
    pub fn index_of(&self, pubkey: &BlsPublicKey) -> Option<usize> {
        self.members.iter().position(|m| m == pubkey)
    }

    /// Whether `pubkey` is a member
    pub fn contains(&self, pubkey: &BlsPublicKey) -> bool {
        self.index_of(pubkey).is_some()
    }

    /// Proposer for `round` given the last block's proposer
    pub fn proposer(&self, last_proposer_index: usize, round: u64) -> Option<(usize, &BlsPublicKey)> {
        let index = proposer_index(last_proposer_index, round, self.len())?;
        self.get(index).map(|pk| (index, pk))
    }

    /// Majority outcome for the given counts
    pub fn tally(&self, approvals: usize, rejections: usize) -> MajorityVote {
        MajorityVote::tally(approvals, rejections, self.len())
    }
}
