//! Chain identity and consensus protocol versions.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifies one chain of the network: the beacon chain or a shard.
///
/// The textual form (`beacon`, `shard-0`, `shard-1`, ...) is the chain key
/// carried by every consensus wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChainKey {
    /// The beacon chain
    Beacon,
    /// A shard chain by index
    Shard(u8),
}

impl ChainKey {
    /// Shard index, `None` for the beacon chain.
    pub fn shard_id(&self) -> Option<u8> {
        match self {
            ChainKey::Beacon => None,
            ChainKey::Shard(id) => Some(*id),
        }
    }

    /// Whether this is the beacon chain.
    pub fn is_beacon(&self) -> bool {
        matches!(self, ChainKey::Beacon)
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKey::Beacon => write!(f, "beacon"),
            ChainKey::Shard(id) => write!(f, "shard-{}", id),
        }
    }
}

impl FromStr for ChainKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "beacon" {
            return Ok(ChainKey::Beacon);
        }
        s.strip_prefix("shard-")
            .and_then(|id| id.parse::<u8>().ok())
            .map(ChainKey::Shard)
            .ok_or_else(|| Error::InvalidChainKey(s.to_string()))
    }
}

impl Serialize for ChainKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChainKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Consensus protocol version a block was produced under.
///
/// The version selects the finality rule applied when the block's view
/// joins the view graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusVersion {
    /// Single-vote BFT: the parent of the best view is final.
    Legacy,
    /// Multi-view BFT: finality needs three views in consecutive timeslots.
    MultiView,
}

impl ConsensusVersion {
    /// Version active at `epoch` given the epoch at which multi-view takes over.
    pub fn for_epoch(epoch: u64, multiview_epoch: u64) -> Self {
        if epoch >= multiview_epoch {
            ConsensusVersion::MultiView
        } else {
            ConsensusVersion::Legacy
        }
    }

    /// Numeric wire/header tag.
    pub fn as_u8(&self) -> u8 {
        match self {
            ConsensusVersion::Legacy => 1,
            ConsensusVersion::MultiView => 2,
        }
    }
}

impl fmt::Display for ConsensusVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusVersion::Legacy => write!(f, "legacy"),
            ConsensusVersion::MultiView => write!(f, "multiview"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_key_text_form() {
        assert_eq!(ChainKey::Beacon.to_string(), "beacon");
        assert_eq!(ChainKey::Shard(7).to_string(), "shard-7");
        assert_eq!("shard-7".parse::<ChainKey>().unwrap(), ChainKey::Shard(7));
        assert_eq!("beacon".parse::<ChainKey>().unwrap(), ChainKey::Beacon);
    }

    #[test]
    fn test_chain_key_rejects_garbage() {
        assert!("shard-".parse::<ChainKey>().is_err());
        assert!("shard-300".parse::<ChainKey>().is_err());
        assert!("Beacon".parse::<ChainKey>().is_err());
    }

    #[test]
    fn test_chain_key_serde_uses_text_form() {
        let json = serde_json::to_string(&ChainKey::Shard(2)).unwrap();
        assert_eq!(json, "\"shard-2\"");
        let back: ChainKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChainKey::Shard(2));
    }

    #[test]
    fn test_version_for_epoch() {
        assert_eq!(ConsensusVersion::for_epoch(0, 5), ConsensusVersion::Legacy);
        assert_eq!(ConsensusVersion::for_epoch(4, 5), ConsensusVersion::Legacy);
        assert_eq!(ConsensusVersion::for_epoch(5, 5), ConsensusVersion::MultiView);
        assert_eq!(ConsensusVersion::for_epoch(9, 5), ConsensusVersion::MultiView);
    }
}
