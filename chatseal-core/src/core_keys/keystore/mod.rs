//! Keystore module
//!
//! Supplies the local user's key material to the encryptor and decryptor.
//! The current key pair wraps and unwraps new messages; historical private
//! keys are kept after rotation so older messages stay readable.

use crate::core_crypto::errors::{CryptoError, CryptoResult};
use crate::core_keys::keypair::{KeyPair, PrivateKey, PublicKey, KEY_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub mod file_keystore;
pub mod memory_keystore;

pub use file_keystore::FileKeyStore;
pub use memory_keystore::MemoryKeyStore;

/// Keystore backend errors
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Other error: {0}")]
    Other(String),
}

impl From<KeystoreError> for CryptoError {
    fn from(e: KeystoreError) -> Self {
        CryptoError::KeyStore(e.to_string())
    }
}

/// Key material held for the current session
#[derive(Clone, Debug, Default)]
pub struct KeyRing {
    current: Option<KeyPair>,
    /// Previous private keys, most recently retired first
    history: Vec<PrivateKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&KeyPair> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[PrivateKey] {
        &self.history
    }

    /// Make `pair` current, retiring the previous current key into history
    pub fn install(&mut self, pair: KeyPair) {
        if let Some(previous) = self.current.take() {
            self.history.insert(0, previous.private_key().clone());
        }
        self.current = Some(pair);
    }

    /// Append a key the user held before this ring was created
    pub fn import_historical(&mut self, key: PrivateKey) {
        let public = key.public_key();
        let known = self.current.as_ref().map(|kp| kp.public_key()) == Some(public)
            || self.history.iter().any(|k| k.public_key() == public);
        if !known {
            self.history.push(key);
        }
    }

    pub(crate) fn to_stored(&self) -> StoredKeyRing {
        StoredKeyRing {
            current: self.current.as_ref().map(|kp| kp.private_key().to_bytes()),
            history: self.history.iter().map(PrivateKey::to_bytes).collect(),
        }
    }

    pub(crate) fn from_stored(stored: &StoredKeyRing) -> Self {
        KeyRing {
            current: stored
                .current
                .map(|bytes| KeyPair::from_private(PrivateKey::from_bytes(bytes))),
            history: stored.history.iter().copied().map(PrivateKey::from_bytes).collect(),
        }
    }
}

/// At-rest form of a key ring: secrets only, public halves are re-derived
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct StoredKeyRing {
    pub(crate) current: Option<[u8; KEY_LEN]>,
    pub(crate) history: Vec<[u8; KEY_LEN]>,
}

/// Abstract keystore trait
pub trait KeyStore: Send + Sync {
    /// Snapshot of the ring; `KeyUnavailable` is derived from it by the
    /// provided methods
    fn key_ring(&self) -> CryptoResult<KeyRing>;

    /// Install a new current key pair (persisting it if the backend persists)
    fn install(&self, pair: KeyPair) -> CryptoResult<()>;

    /// Import a private key from before this device's ring existed
    fn import_historical(&self, key: PrivateKey) -> CryptoResult<()>;

    fn public_key(&self) -> CryptoResult<PublicKey> {
        self.key_ring()?
            .current()
            .map(KeyPair::public_key)
            .ok_or(CryptoError::KeyUnavailable)
    }

    fn private_key(&self) -> CryptoResult<PrivateKey> {
        self.key_ring()?
            .current()
            .map(|kp| kp.private_key().clone())
            .ok_or(CryptoError::KeyUnavailable)
    }

    fn historical_private_keys(&self) -> CryptoResult<Vec<PrivateKey>> {
        let ring = self.key_ring()?;
        if ring.current().is_none() && ring.history().is_empty() {
            return Err(CryptoError::KeyUnavailable);
        }
        Ok(ring.history().to_vec())
    }

    /// Current key first, then historical keys, newest first
    fn candidate_private_keys(&self) -> CryptoResult<Vec<PrivateKey>> {
        let ring = self.key_ring()?;
        let mut candidates = Vec::with_capacity(ring.history().len() + 1);
        if let Some(current) = ring.current() {
            candidates.push(current.private_key().clone());
        }
        candidates.extend(ring.history().iter().cloned());
        if candidates.is_empty() {
            return Err(CryptoError::KeyUnavailable);
        }
        Ok(candidates)
    }

    /// Generate a new key pair and retire the current one
    fn rotate(&self) -> CryptoResult<PublicKey> {
        let pair = KeyPair::generate();
        let public = pair.public_key();
        self.install(pair)?;
        info!(fingerprint = %public.fingerprint(), "Rotated local key pair");
        Ok(public)
    }

    /// Generate the first key pair if none exists yet
    fn ensure_keys(&self) -> CryptoResult<PublicKey> {
        match self.public_key() {
            Ok(public) => Ok(public),
            Err(CryptoError::KeyUnavailable) => self.rotate(),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_retires_previous_key() {
        let mut ring = KeyRing::new();
        let first = KeyPair::generate();
        let second = KeyPair::generate();

        ring.install(first.clone());
        ring.install(second.clone());

        assert_eq!(ring.current().unwrap().public_key(), second.public_key());
        assert_eq!(ring.history().len(), 1);
        assert_eq!(ring.history()[0].public_key(), first.public_key());
    }

    #[test]
    fn test_import_historical_skips_known_keys() {
        let mut ring = KeyRing::new();
        let kp = KeyPair::generate();
        ring.install(kp.clone());

        ring.import_historical(kp.private_key().clone());
        assert!(ring.history().is_empty());

        let old = KeyPair::generate();
        ring.import_historical(old.private_key().clone());
        ring.import_historical(old.private_key().clone());
        assert_eq!(ring.history().len(), 1);
    }

    #[test]
    fn test_stored_roundtrip_preserves_order() {
        let mut ring = KeyRing::new();
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let c = KeyPair::generate();
        ring.install(a.clone());
        ring.install(b.clone());
        ring.install(c.clone());

        let restored = KeyRing::from_stored(&ring.to_stored());
        assert_eq!(restored.current().unwrap().public_key(), c.public_key());
        let history: Vec<_> = restored.history().iter().map(PrivateKey::public_key).collect();
        assert_eq!(history, vec![b.public_key(), a.public_key()]);
    }
}
