//! # Meridian Crypto
//!
//! Cryptographic primitives for the Meridian consensus core.
//!
//! This crate provides:
//! - **BLS12-381 signatures** - wire message authentication and aggregatable
//!   block votes for commit certificates
//! - **BN254 G1 point codec** - 32-byte compressed points with a y-parity flag
//!
//! ## Example
//!
//! ```rust
//! use meridian_crypto::bls::{BlsPrivateKey, DomainTag};
//!
//! let hash = [7u8; 32];
//!
//! let sk = BlsPrivateKey::random();
//! let domain = DomainTag::new_vote("beacon");
//! let sig = sk.sign_with_domain(&hash, &domain);
//! assert!(sig.verify_with_domain(&hash, &sk.public_key(), &domain));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod bls;
pub mod bn254;

pub use bls::{BlsPrivateKey, BlsPublicKey, BlsSignature, DomainTag, MessageType, ValidatorKeyPair};
pub use bn254::G1Point;

/// Error types for cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid private key bytes
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid public key bytes
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid signature bytes
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// BLS operation failed
    #[error("BLS operation failed: {0}")]
    BlsError(String),

    /// Bytes do not encode a point of the curve
    #[error("invalid curve point: {0}")]
    InvalidPoint(String),

    /// Invalid input length
    #[error("invalid input length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Hex decoding error
    #[error("hex decoding error: {0}")]
    HexError(String),
}

impl From<hex::FromHexError> for CryptoError {
    fn from(e: hex::FromHexError) -> Self {
        CryptoError::HexError(e.to_string())
    }
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Decode a hex string (optional `0x` prefix) into a fixed-size array.
pub(crate) fn decode_fixed<const N: usize>(hex_str: &str) -> Result<[u8; N]> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(hex_str)?;
    bytes.try_into().map_err(|v: Vec<u8>| CryptoError::InvalidLength {
        expected: N,
        actual: v.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fixed_rejects_wrong_length() {
        let err = decode_fixed::<4>("0x0102").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidLength {
                expected: 4,
                actual: 2
            }
        ));
        assert_eq!(decode_fixed::<2>("0102").unwrap(), [1, 2]);
    }

    #[test]
    fn test_bls_aggregate() {
        let keys: Vec<_> = (0..3).map(|_| bls::BlsPrivateKey::random()).collect();
        let pubkeys: Vec<_> = keys.iter().map(|k| k.public_key()).collect();
        let domain = DomainTag::new_block_vote("shard-0");
        let message = b"block hash";

        let signatures: Vec<_> = keys.iter().map(|k| k.sign_with_domain(message, &domain)).collect();
        let sig_refs: Vec<_> = signatures.iter().collect();

        let aggregate = BlsSignature::aggregate(&sig_refs).unwrap();
        let pubkey_refs: Vec<_> = pubkeys.iter().collect();
        assert!(aggregate.verify_aggregate(message, &pubkey_refs, &domain));
    }
}
