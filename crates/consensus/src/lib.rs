//! # Meridian Consensus
//!
//! Committee-based BFT consensus for the beacon chain and every shard chain
//! of the Meridian network.
//!
//! Each chain runs its own round state machine. A round is derived from the
//! wall clock and the chain's last block, so validators agree on the round
//! and its proposer without exchanging timeout messages. A block is inserted
//! once more than two thirds of the chain committee approve it.
//!
//! ## Components
//!
//! ```text
//!                    ┌─────────────────────────────┐
//!   roles, chains ──▶│           Engine            │◀── inbound messages
//!                    └──────┬───────────────┬──────┘
//!                           │ one per chain │
//!                    ┌──────▼──────┐ ┌──────▼──────┐
//!                    │RoundProcess │ │RoundProcess │──▶ outbound messages
//!                    │  (beacon)   │ │  (shard-0)  │
//!                    └──────┬──────┘ └─────────────┘
//!          Committee, VoteBook, ByzantineDetector
//!                           │
//!                    ┌──────▼──────┐
//!                    │    Chain    │  create / validate / insert
//!                    └──────┬──────┘
//!                    ┌──────▼──────┐
//!                    │  MultiView  │  best and final view
//!                    └─────────────┘
//! ```
//!
//! ## Finality
//!
//! - **Legacy**: the parent of the best view is final
//! - **MultiView**: a view is final once it and the two views after it
//!   occupy consecutive timeslots

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod byzantine;
pub mod chain;
pub mod committee;
pub mod engine;
pub mod message;
pub mod multiview;
pub mod process;
pub mod timeout;
pub mod types;
pub mod vote_set;

pub use byzantine::{ByzantineConfig, ByzantineDetector, ByzantineError, DEFAULT_BLACKLIST_TTL};
pub use chain::{BlockRequest, Chain, ChainError};
pub use committee::{majority_threshold, proposer_index, Committee, MajorityVote};
pub use engine::{
    CommitteeRole, ConsensusHost, Engine, EngineConfig, EngineError, ValidatorRole,
};
pub use message::{
    block_vote_bytes, CommitCertificate, ConsensusMessage, MessageError, MessageKind,
    ProposePayload, VotePayload,
};
pub use multiview::{MultiView, Tips, ViewGraph};
pub use process::{
    ProcessConfig, ProcessError, ProcessHandle, ProcessInbox, ProcessInput, RoundProcess,
};
pub use timeout::{now_millis, now_secs, TimeoutConfig};
pub use types::{ParseRoundKeyError, Phase, RoundKey, RoundSnapshot};
pub use vote_set::{VoteBook, VoteRecord, VoteSet, VoteSetError};
