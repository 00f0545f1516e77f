//! Consensus wire messages.
//!
//! Every message is an envelope carrying a JSON payload plus the sender's
//! BLS signature over:
//!
//! ```text
//! chain_key || payload || sender_pubkey (hex) || round_key || timestamp (u64 BE)
//! ```
//!
//! The envelope is signed under the chain's propose or vote domain. Vote
//! payloads carry a second signature over `block_hash || approve` under the
//! block-vote domain; approvals of the same block sign identical bytes and
//! can be aggregated into a [`CommitCertificate`].

use std::fmt;

use meridian_crypto::{BlsPublicKey, BlsSignature, CryptoError, DomainTag, ValidatorKeyPair};
use meridian_types::{Block, ChainKey, H256};
use serde::{Deserialize, Serialize};

use crate::committee::Committee;
use crate::types::{ParseRoundKeyError, RoundKey};

/// Errors decoding or verifying a consensus message
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Payload is not valid JSON for its kind
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Sender key or signature failed to decode
    #[error("malformed key material: {0}")]
    Crypto(#[from] CryptoError),

    /// Envelope signature does not verify
    #[error("invalid signature from {sender}")]
    InvalidSignature {
        /// Hex public key claimed by the envelope
        sender: String,
    },

    /// Round key text is malformed
    #[error(transparent)]
    RoundKey(#[from] ParseRoundKeyError),

    /// Message kind does not match the decoder used
    #[error("expected {expected} message, got {actual}")]
    WrongKind {
        /// Kind the caller asked for
        expected: MessageKind,
        /// Kind on the envelope
        actual: MessageKind,
    },
}

/// Kind of consensus message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A block proposal
    Propose,
    /// A vote on a proposal
    Vote,
}

impl MessageKind {
    fn domain(&self, chain_key: ChainKey) -> DomainTag {
        match self {
            MessageKind::Propose => DomainTag::new_propose(chain_key.to_string()),
            MessageKind::Vote => DomainTag::new_vote(chain_key.to_string()),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Propose => write!(f, "propose"),
            MessageKind::Vote => write!(f, "vote"),
        }
    }
}

/// Payload of a propose message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposePayload {
    /// The proposed block
    pub block: Block,
}

/// Payload of a vote message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePayload {
    /// Hash of the block voted on
    pub block_hash: H256,
    /// Height of the block voted on
    pub height: u64,
    /// Timeslot of the block's propose time
    pub propose_timeslot: i64,
    /// Timeslot of the block's produce time
    pub produce_timeslot: i64,
    /// Approve or reject
    pub approve: bool,
    /// Signature over [`block_vote_bytes`] under the block-vote domain
    pub block_signature: BlsSignature,
}

/// Bytes a validator signs to vote on a block
pub fn block_vote_bytes(block_hash: &H256, approve: bool) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(33);
    bytes.extend_from_slice(block_hash.as_bytes());
    bytes.push(approve as u8);
    bytes
}

/// Signed consensus envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusMessage {
    /// Chain the message belongs to
    pub chain_key: ChainKey,
    /// Propose or vote
    pub kind: MessageKind,
    /// JSON-encoded [`ProposePayload`] or [`VotePayload`]
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    /// Sender's BLS public key (hex)
    pub sender_pubkey: String,
    /// Sender's BLS signature over [`ConsensusMessage::signing_bytes`] (hex)
    pub signature: String,
    /// `height_round` text form of the round key
    pub round_key: String,
    /// Unix seconds when the message was created
    pub timestamp: i64,
}

impl ConsensusMessage {
    /// Build and sign a propose message
    pub fn propose(
        chain_key: ChainKey,
        round_key: RoundKey,
        payload: &ProposePayload,
        signer: &ValidatorKeyPair,
        timestamp: i64,
    ) -> Result<Self, MessageError> {
        let payload = serde_json::to_vec(payload)?;
        Ok(Self::signed(MessageKind::Propose, chain_key, round_key, payload, signer, timestamp))
    }

    /// Build and sign a vote message
    pub fn vote(
        chain_key: ChainKey,
        round_key: RoundKey,
        payload: &VotePayload,
        signer: &ValidatorKeyPair,
        timestamp: i64,
    ) -> Result<Self, MessageError> {
        let payload = serde_json::to_vec(payload)?;
        Ok(Self::signed(MessageKind::Vote, chain_key, round_key, payload, signer, timestamp))
    }

    fn signed(
        kind: MessageKind,
        chain_key: ChainKey,
        round_key: RoundKey,
        payload: Vec<u8>,
        signer: &ValidatorKeyPair,
        timestamp: i64,
    ) -> Self {
        let mut msg = Self {
            chain_key,
            kind,
            payload,
            sender_pubkey: signer.public_hex().to_string(),
            signature: String::new(),
            round_key: round_key.to_string(),
            timestamp,
        };
        let signature = signer.sign_with_domain(&msg.signing_bytes(), &kind.domain(chain_key));
        msg.signature = signature.to_hex();
        msg
    }

    /// Bytes covered by the envelope signature
    pub fn signing_bytes(&self) -> Vec<u8> {
        let chain_key = self.chain_key.to_string();
        let mut bytes = Vec::with_capacity(
            chain_key.len()
                + self.payload.len()
                + self.sender_pubkey.len()
                + self.round_key.len()
                + 8,
        );
        bytes.extend_from_slice(chain_key.as_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes.extend_from_slice(self.sender_pubkey.as_bytes());
        bytes.extend_from_slice(self.round_key.as_bytes());
        bytes.extend_from_slice(&(self.timestamp as u64).to_be_bytes());
        bytes
    }

    /// Verify the envelope signature, returning the sender's key
    pub fn verify(&self) -> Result<BlsPublicKey, MessageError> {
        let sender = BlsPublicKey::from_hex(&self.sender_pubkey)?;
        let signature = BlsSignature::from_hex(&self.signature)?;
        let domain = self.kind.domain(self.chain_key);
        if signature.verify_with_domain(&self.signing_bytes(), &sender, &domain) {
            Ok(sender)
        } else {
            Err(MessageError::InvalidSignature {
                sender: self.sender_pubkey.clone(),
            })
        }
    }

    /// Parsed round key
    pub fn parse_round_key(&self) -> Result<RoundKey, MessageError> {
        Ok(self.round_key.parse()?)
    }

    /// Decode a propose payload
    pub fn propose_payload(&self) -> Result<ProposePayload, MessageError> {
        self.expect_kind(MessageKind::Propose)?;
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Decode a vote payload
    pub fn vote_payload(&self) -> Result<VotePayload, MessageError> {
        self.expect_kind(MessageKind::Vote)?;
        Ok(serde_json::from_slice(&self.payload)?)
    }

    fn expect_kind(&self, expected: MessageKind) -> Result<(), MessageError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(MessageError::WrongKind {
                expected,
                actual: self.kind,
            })
        }
    }
}

/// Proof that a committee majority approved a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitCertificate {
    /// Round the block was decided in
    pub round_key: RoundKey,
    /// Approved block
    pub block_hash: H256,
    /// Committee indices of the approving validators, ascending
    pub signers: Vec<usize>,
    /// Aggregate of the signers' block-vote signatures
    pub aggregate_signature: BlsSignature,
}

impl CommitCertificate {
    /// Check the aggregate signature against the committee.
    ///
    /// Does not check that the signers form a majority.
    pub fn verify(&self, committee: &Committee, chain_key: ChainKey) -> bool {
        let keys: Option<Vec<&BlsPublicKey>> =
            self.signers.iter().map(|&i| committee.get(i)).collect();
        let Some(keys) = keys else {
            return false;
        };
        let domain = DomainTag::new_block_vote(chain_key.to_string());
        self.aggregate_signature
            .verify_aggregate(&block_vote_bytes(&self.block_hash, true), &keys, &domain)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
