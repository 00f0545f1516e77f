//! Validator key files.
//!
//! A key file is JSON holding the hex BLS private key and, for operators, the
//! matching public key:
//!
//! ```json
//! { "bls_private_key": "…", "bls_public_key": "…" }
//! ```
//!
//! A file whose public key does not match its private key is rejected.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use meridian_crypto::{BlsPrivateKey, ValidatorKeyPair};

/// Validator key pair for consensus participation
#[derive(Clone, Debug)]
pub struct ValidatorKeys {
    keypair: ValidatorKeyPair,
}

impl ValidatorKeys {
    /// Load validator keys from a file
    pub fn load(path: &Path) -> Result<Self> {
        let key_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read validator key from {}", path.display()))?;

        let key_data: ValidatorKeyFile = serde_json::from_slice(&key_bytes)
            .with_context(|| format!("Failed to parse validator key file {}", path.display()))?;

        let private_key = BlsPrivateKey::from_hex(&key_data.bls_private_key)
            .with_context(|| format!("Malformed BLS private key in {}", path.display()))?;
        let keypair = ValidatorKeyPair::from_private_key(private_key);

        if !key_data
            .bls_public_key
            .trim_start_matches("0x")
            .eq_ignore_ascii_case(keypair.public_hex())
        {
            bail!(
                "Public key in {} does not match its private key",
                path.display()
            );
        }

        Ok(Self { keypair })
    }

    /// Load every key file, failing on the first bad one
    pub fn load_all(paths: &[PathBuf]) -> Result<Vec<Self>> {
        let keys = paths
            .iter()
            .map(|path| Self::load(path))
            .collect::<Result<Vec<_>>>()?;
        info!(count = keys.len(), "Loaded validator keys");
        Ok(keys)
    }

    /// Generate new validator keys
    pub fn generate() -> Self {
        Self {
            keypair: ValidatorKeyPair::generate(),
        }
    }

    /// Save validator keys to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let key_data = ValidatorKeyFile {
            bls_private_key: self.keypair.private_key().to_hex(),
            bls_public_key: self.keypair.public_hex().to_string(),
        };

        let json = serde_json::to_string_pretty(&key_data)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write validator key to {}", path.display()))?;

        Ok(())
    }

    /// Hex public key
    pub fn public_hex(&self) -> &str {
        self.keypair.public_hex()
    }

    /// The consensus key pair
    pub fn keypair(&self) -> &ValidatorKeyPair {
        &self.keypair
    }

    /// Unwrap into the consensus key pair
    pub fn into_keypair(self) -> ValidatorKeyPair {
        self.keypair
    }
}

/// Validator key file format
#[derive(Serialize, Deserialize)]
struct ValidatorKeyFile {
    bls_private_key: String,
    bls_public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validator.json");

        let keys = ValidatorKeys::generate();
        keys.save(&path).unwrap();

        let loaded = ValidatorKeys::load(&path).unwrap();
        assert_eq!(loaded.public_hex(), keys.public_hex());
    }

    #[test]
    fn test_mismatched_public_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validator.json");

        let keys = ValidatorKeys::generate();
        let other = ValidatorKeys::generate();
        let json = serde_json::json!({
            "bls_private_key": keys.keypair().private_key().to_hex(),
            "bls_public_key": other.public_hex(),
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let err = ValidatorKeys::load(&path).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("absent.json");
        assert!(ValidatorKeys::load(&missing).is_err());

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(ValidatorKeys::load(&garbage).is_err());

        let bad_hex = dir.path().join("bad_hex.json");
        std::fs::write(
            &bad_hex,
            r#"{"bls_private_key": "zz", "bls_public_key": "00"}"#,
        )
        .unwrap();
        assert!(ValidatorKeys::load(&bad_hex).is_err());

        let paths = vec![missing];
        assert!(ValidatorKeys::load_all(&paths).is_err());
    }
}
