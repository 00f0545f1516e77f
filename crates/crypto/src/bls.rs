//! # BLS12-381 Signatures for Consensus
//!
//! Validators sign every consensus wire message and every block vote with
//! BLS12-381 keys (`min_pk` variant: 48-byte public keys, 96-byte signatures).
//! Approving block votes all sign the same message, so a committee's approvals
//! collapse into one aggregate signature for the commit certificate.
//!
//! ## Domain Separation
//!
//! Each signature is bound to a message type and a chain key
//! (`beacon`, `shard-0`, ...), so a vote on one shard can never be replayed as
//! a proposal signature or as a vote on another chain.
//!
//! ## Example
//!
//! ```rust
//! use meridian_crypto::bls::{BlsPrivateKey, BlsSignature, DomainTag};
//!
//! let keys: Vec<_> = (0..3).map(|_| BlsPrivateKey::random()).collect();
//! let pubkeys: Vec<_> = keys.iter().map(|k| k.public_key()).collect();
//! let domain = DomainTag::new_block_vote("beacon");
//!
//! let sigs: Vec<_> = keys.iter().map(|k| k.sign_with_domain(b"block", &domain)).collect();
//! let refs: Vec<_> = sigs.iter().collect();
//! let aggregate = BlsSignature::aggregate(&refs).unwrap();
//!
//! let pk_refs: Vec<_> = pubkeys.iter().collect();
//! assert!(aggregate.verify_aggregate(b"block", &pk_refs, &domain));
//! ```

use crate::{decode_fixed, CryptoError, Result};
use blst::min_pk::{AggregatePublicKey, AggregateSignature, PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Domain separation tag prefix for Meridian BLS signatures.
const DST_PREFIX: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_MERIDIAN_";

/// Size of a compressed public key.
pub const PUBLIC_KEY_SIZE: usize = 48;

/// Size of a compressed signature.
pub const SIGNATURE_SIZE: usize = 96;

// ============================================================================
// Domain Separation
// ============================================================================

/// Message types for domain separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Envelope signature of a propose message
    Propose,
    /// Envelope signature of a vote message
    Vote,
    /// Signature over a block hash and approve flag, aggregated into commit certificates
    BlockVote,
}

impl MessageType {
    /// Get the string tag for this message type.
    pub fn as_tag(&self) -> &'static str {
        match self {
            MessageType::Propose => "PROPOSE",
            MessageType::Vote => "VOTE",
            MessageType::BlockVote => "BLOCKVOTE",
        }
    }
}

/// Domain separation tag for BLS signatures.
///
/// Format: `<prefix><MESSAGE_TYPE>_<CHAIN_KEY>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainTag {
    message_type: MessageType,
    chain_key: String,
    dst: Vec<u8>,
}

impl DomainTag {
    /// Create a new domain tag for a message type on a chain.
    pub fn new(message_type: MessageType, chain_key: impl Into<String>) -> Self {
        let chain_key = chain_key.into();
        let mut dst = Vec::with_capacity(DST_PREFIX.len() + 16 + chain_key.len());
        dst.extend_from_slice(DST_PREFIX);
        dst.extend_from_slice(message_type.as_tag().as_bytes());
        dst.push(b'_');
        dst.extend_from_slice(chain_key.as_bytes());
        Self {
            message_type,
            chain_key,
            dst,
        }
    }

    /// Domain tag for propose envelopes.
    pub fn new_propose(chain_key: impl Into<String>) -> Self {
        Self::new(MessageType::Propose, chain_key)
    }

    /// Domain tag for vote envelopes.
    pub fn new_vote(chain_key: impl Into<String>) -> Self {
        Self::new(MessageType::Vote, chain_key)
    }

    /// Domain tag for aggregatable block votes.
    pub fn new_block_vote(chain_key: impl Into<String>) -> Self {
        Self::new(MessageType::BlockVote, chain_key)
    }

    /// Get the message type.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Get the chain key.
    pub fn chain_key(&self) -> &str {
        &self.chain_key
    }

    /// Get the full DST bytes for signing.
    pub fn dst(&self) -> &[u8] {
        &self.dst
    }
}

// ============================================================================
// BLS Private Key
// ============================================================================

/// BLS private key (secret key)
///
/// A 32-byte scalar used for signing. Must be kept secret.
#[derive(Clone)]
pub struct BlsPrivateKey {
    inner: SecretKey,
}

impl BlsPrivateKey {
    /// Generate a random BLS private key using the OS RNG.
    pub fn random() -> Self {
        loop {
            let mut ikm = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut ikm);
            // key_gen only rejects IKM shorter than 32 bytes
            if let Ok(sk) = SecretKey::key_gen(&ikm, &[]) {
                return Self { inner: sk };
            }
        }
    }

    /// Derive a BLS private key from input keying material (at least 32 bytes).
    pub fn from_seed(ikm: &[u8]) -> Result<Self> {
        if ikm.len() < 32 {
            return Err(CryptoError::InvalidLength {
                expected: 32,
                actual: ikm.len(),
            });
        }
        let sk = SecretKey::key_gen(ikm, &[])
            .map_err(|_| CryptoError::InvalidPrivateKey("key generation failed".to_string()))?;
        Ok(Self { inner: sk })
    }

    /// Create a BLS private key from a 32-byte big-endian scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let sk = SecretKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(format!("{:?}", e)))?;
        Ok(Self { inner: sk })
    }

    /// Create a BLS private key from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        Self::from_bytes(&decode_fixed::<32>(hex)?)
    }

    /// Get the raw bytes of the private key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Get the hex-encoded private key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Derive the public key from this private key.
    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey {
            inner: self.inner.sk_to_pk(),
        }
    }

    /// Sign a message under a domain tag.
    pub fn sign_with_domain(&self, message: &[u8], domain: &DomainTag) -> BlsSignature {
        BlsSignature {
            inner: self.inner.sign(message, domain.dst(), &[]),
        }
    }
}

impl std::fmt::Debug for BlsPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlsPrivateKey")
            .field("public_key", &self.public_key().to_hex())
            .finish()
    }
}

// ============================================================================
// BLS Public Key
// ============================================================================

/// BLS public key (48 bytes, G1 point)
///
/// Implements `Ord` and `Hash` on its compressed bytes, so it can key vote maps
/// and be sorted deterministically.
#[derive(Clone)]
pub struct BlsPublicKey {
    inner: PublicKey,
}

impl BlsPublicKey {
    /// Create a public key from compressed bytes.
    ///
    /// Rejects bytes that are not a canonical encoding of a curve point.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self> {
        let pk = PublicKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("{:?}", e)))?;
        if pk.to_bytes() != *bytes {
            return Err(CryptoError::BlsError(
                "non-canonical public key encoding".to_string(),
            ));
        }
        Ok(Self { inner: pk })
    }

    /// Create a public key from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        Self::from_bytes(&decode_fixed::<PUBLIC_KEY_SIZE>(hex)?)
    }

    /// Get the compressed public key bytes.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// Get the hex-encoded public key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Aggregate multiple public keys into one.
    pub fn aggregate(pubkeys: &[&BlsPublicKey]) -> Result<Self> {
        if pubkeys.is_empty() {
            return Err(CryptoError::BlsError(
                "cannot aggregate empty list".to_string(),
            ));
        }
        let pks: Vec<&PublicKey> = pubkeys.iter().map(|pk| &pk.inner).collect();
        let agg = AggregatePublicKey::aggregate(&pks, false)
            .map_err(|e| CryptoError::BlsError(format!("aggregation failed: {:?}", e)))?;
        Ok(Self {
            inner: agg.to_public_key(),
        })
    }
}

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsPublicKey {}

impl PartialOrd for BlsPublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlsPublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl std::hash::Hash for BlsPublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl std::fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlsPublicKey({})", &self.to_hex()[..16])
    }
}

impl Serialize for BlsPublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlsPublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BlsPublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// BLS Signature
// ============================================================================

/// BLS signature (96 bytes, G2 point)
#[derive(Clone)]
pub struct BlsSignature {
    inner: Signature,
}

impl BlsSignature {
    /// Create a signature from compressed bytes.
    ///
    /// Validates canonical encoding to prevent malleability.
    pub fn from_bytes(bytes: &[u8; SIGNATURE_SIZE]) -> Result<Self> {
        let sig = Signature::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidSignature(format!("{:?}", e)))?;
        if sig.to_bytes() != *bytes {
            return Err(CryptoError::BlsError(
                "non-canonical signature encoding".to_string(),
            ));
        }
        Ok(Self { inner: sig })
    }

    /// Create a signature from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        Self::from_bytes(&decode_fixed::<SIGNATURE_SIZE>(hex)?)
    }

    /// Get the compressed signature bytes.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.inner.to_bytes()
    }

    /// Get the hex-encoded signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Verify the signature against a message, public key and domain.
    pub fn verify_with_domain(
        &self,
        message: &[u8],
        public_key: &BlsPublicKey,
        domain: &DomainTag,
    ) -> bool {
        let result = self
            .inner
            .verify(true, message, domain.dst(), &[], &public_key.inner, true);
        result == BLST_ERROR::BLST_SUCCESS
    }

    /// Aggregate signatures over the same message into one.
    pub fn aggregate(signatures: &[&BlsSignature]) -> Result<Self> {
        if signatures.is_empty() {
            return Err(CryptoError::BlsError(
                "cannot aggregate empty list".to_string(),
            ));
        }
        let sigs: Vec<&Signature> = signatures.iter().map(|s| &s.inner).collect();
        let agg = AggregateSignature::aggregate(&sigs, false)
            .map_err(|e| CryptoError::BlsError(format!("aggregation failed: {:?}", e)))?;
        Ok(Self {
            inner: agg.to_signature(),
        })
    }

    /// Verify an aggregate signature: every key in `public_keys` signed `message`.
    pub fn verify_aggregate(
        &self,
        message: &[u8],
        public_keys: &[&BlsPublicKey],
        domain: &DomainTag,
    ) -> bool {
        if public_keys.is_empty() {
            return false;
        }
        let pks: Vec<&PublicKey> = public_keys.iter().map(|pk| &pk.inner).collect();
        let result = self
            .inner
            .fast_aggregate_verify(true, message, domain.dst(), &pks);
        result == BLST_ERROR::BLST_SUCCESS
    }
}

impl PartialEq for BlsSignature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsSignature {}

impl std::fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlsSignature({})", &self.to_hex()[..16])
    }
}

impl Serialize for BlsSignature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlsSignature {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BlsSignature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Validator Key Pair
// ============================================================================

/// A validator's consensus key pair with the public key cached in hex form,
/// which is how validators are identified on the wire.
#[derive(Clone)]
pub struct ValidatorKeyPair {
    private_key: BlsPrivateKey,
    public_key: BlsPublicKey,
    public_hex: String,
}

impl ValidatorKeyPair {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        Self::from_private_key(BlsPrivateKey::random())
    }

    /// Wrap an existing private key.
    pub fn from_private_key(private_key: BlsPrivateKey) -> Self {
        let public_key = private_key.public_key();
        let public_hex = public_key.to_hex();
        Self {
            private_key,
            public_key,
            public_hex,
        }
    }

    /// The private key.
    pub fn private_key(&self) -> &BlsPrivateKey {
        &self.private_key
    }

    /// The public key.
    pub fn public_key(&self) -> &BlsPublicKey {
        &self.public_key
    }

    /// Hex form of the public key.
    pub fn public_hex(&self) -> &str {
        &self.public_hex
    }

    /// Sign with the private key under a domain.
    pub fn sign_with_domain(&self, message: &[u8], domain: &DomainTag) -> BlsSignature {
        self.private_key.sign_with_domain(message, domain)
    }
}

impl std::fmt::Debug for ValidatorKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorKeyPair")
            .field("public_key", &self.public_hex)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_tags_differ_per_chain_and_type() {
        let a = DomainTag::new_vote("beacon");
        let b = DomainTag::new_vote("shard-0");
        let c = DomainTag::new_propose("beacon");
        assert_ne!(a.dst(), b.dst());
        assert_ne!(a.dst(), c.dst());
        assert!(a.dst().ends_with(b"VOTE_beacon"));
    }

    #[test]
    fn test_signature_rejected_under_other_domain() {
        let sk = BlsPrivateKey::random();
        let pk = sk.public_key();
        let sig = sk.sign_with_domain(b"msg", &DomainTag::new_vote("beacon"));
        assert!(sig.verify_with_domain(b"msg", &pk, &DomainTag::new_vote("beacon")));
        assert!(!sig.verify_with_domain(b"msg", &pk, &DomainTag::new_vote("shard-1")));
        assert!(!sig.verify_with_domain(b"msg", &pk, &DomainTag::new_propose("beacon")));
    }

    #[test]
    fn test_aggregate_fails_with_missing_signer() {
        let keys: Vec<_> = (0..3).map(|_| BlsPrivateKey::random()).collect();
        let domain = DomainTag::new_block_vote("beacon");
        let sigs: Vec<_> = keys[..2]
            .iter()
            .map(|k| k.sign_with_domain(b"block", &domain))
            .collect();
        let refs: Vec<_> = sigs.iter().collect();
        let agg = BlsSignature::aggregate(&refs).unwrap();

        let pubkeys: Vec<_> = keys.iter().map(|k| k.public_key()).collect();
        let all: Vec<_> = pubkeys.iter().collect();
        assert!(!agg.verify_aggregate(b"block", &all, &domain));
        assert!(agg.verify_aggregate(b"block", &all[..2], &domain));
    }

    #[test]
    fn test_empty_aggregate_is_error() {
        assert!(BlsSignature::aggregate(&[]).is_err());
        assert!(BlsPublicKey::aggregate(&[]).is_err());
    }

    #[test]
    fn test_keypair_hex_identity() {
        let pair = ValidatorKeyPair::generate();
        assert_eq!(pair.public_hex(), pair.public_key().to_hex());
        let parsed = BlsPublicKey::from_hex(pair.public_hex()).unwrap();
        assert_eq!(&parsed, pair.public_key());
    }
}
