//! Round bookkeeping types.
//!
//! - [`Phase`] - where a chain's round state machine currently is
//! - [`RoundKey`] - composite `height_round` key votes and proposals are filed under
//! - [`RoundSnapshot`] - read-only view of a running process

use std::fmt;
use std::str::FromStr;

use meridian_types::{ChainKey, ConsensusVersion, H256};
use serde::{Deserialize, Serialize};

/// Phase of the per-chain round state machine
///
/// ```text
/// NewRound -> Propose -> Prepare -> NewRound
///     |                    ^
///     +----> Listen -------+
/// ```
///
/// Any phase falls back to `NewRound` when the round times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Phase {
    /// Waiting for the chain to be ready and the minimum block interval to pass
    #[default]
    NewRound,
    /// This node holds the proposer key and is creating a block
    Propose,
    /// Waiting for the round's proposal
    Listen,
    /// Voting on the active block and collecting votes
    Prepare,
}

impl Phase {
    /// Returns true if this phase can transition to the target phase
    #[must_use]
    pub fn can_transition_to(&self, target: Phase) -> bool {
        matches!(
            (self, target),
            (Phase::NewRound, Phase::Propose)
                | (Phase::NewRound, Phase::Listen)
                | (Phase::Propose, Phase::Prepare)
                | (Phase::Propose, Phase::Listen)
                | (Phase::Listen, Phase::Prepare)
                | (_, Phase::NewRound)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::NewRound => write!(f, "NEWROUND"),
            Phase::Propose => write!(f, "PROPOSE"),
            Phase::Listen => write!(f, "LISTEN"),
            Phase::Prepare => write!(f, "PREPARE"),
        }
    }
}

/// Error parsing a [`RoundKey`] from its text form
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid round key: {0:?}")]
pub struct ParseRoundKeyError(pub String);

/// Key of one voting round: the height being decided and the round within it.
///
/// Ordered by height, then round, so superseded keys sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundKey {
    /// Height being decided
    pub height: u64,
    /// Round within the height
    pub round: u64,
}

impl RoundKey {
    /// Create a round key
    pub const fn new(height: u64, round: u64) -> Self {
        Self { height, round }
    }
}

impl fmt::Display for RoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.height, self.round)
    }
}

impl FromStr for RoundKey {
    type Err = ParseRoundKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (height, round) = s
            .split_once('_')
            .ok_or_else(|| ParseRoundKeyError(s.to_string()))?;
        match (height.parse(), round.parse()) {
            (Ok(height), Ok(round)) => Ok(Self { height, round }),
            _ => Err(ParseRoundKeyError(s.to_string())),
        }
    }
}

/// Point-in-time state of one chain's round process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Chain the process runs for
    pub chain: ChainKey,
    /// Finality rule the process was started with
    pub version: ConsensusVersion,
    /// Current phase
    pub phase: Phase,
    /// Height the process is trying to decide
    pub next_height: u64,
    /// Current round
    pub round: u64,
    /// Hosted validator keys (hex)
    pub validators: Vec<String>,
    /// Block being voted on in the current round
    pub active_block: Option<H256>,
    /// Round keys with at least one recorded vote
    pub vote_rounds: usize,
    /// Proposals waiting for their round
    pub buffered_proposals: usize,
}

impl RoundSnapshot {
    /// Round key of the snapshot's round
    pub fn round_key(&self) -> RoundKey {
        RoundKey::new(self.next_height, self.round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_key_text_form() {
        let key = RoundKey::new(12, 3);
        assert_eq!(key.to_string(), "12_3");
        assert_eq!("12_3".parse::<RoundKey>().unwrap(), key);
    }

    #[test]
    fn round_key_rejects_garbage() {
        assert!("12".parse::<RoundKey>().is_err());
        assert!("a_1".parse::<RoundKey>().is_err());
        assert!("1_-1".parse::<RoundKey>().is_err());
    }

    #[test]
    fn round_keys_order_by_height_then_round() {
        assert!(RoundKey::new(5, 9) < RoundKey::new(6, 0));
        assert!(RoundKey::new(6, 0) < RoundKey::new(6, 1));
    }

    #[test]
    fn phase_transitions() {
        assert!(Phase::NewRound.can_transition_to(Phase::Propose));
        assert!(Phase::NewRound.can_transition_to(Phase::Listen));
        assert!(Phase::Listen.can_transition_to(Phase::Prepare));
        assert!(Phase::Prepare.can_transition_to(Phase::NewRound));
        assert!(!Phase::Listen.can_transition_to(Phase::Propose));
        assert!(!Phase::NewRound.can_transition_to(Phase::Prepare));
    }
}
