//! In-memory keystore (session lifetime, nothing persisted)

use super::{KeyRing, KeyStore, KeystoreError};
use crate::core_crypto::errors::CryptoResult;
use crate::core_keys::keypair::{KeyPair, PrivateKey};
use std::sync::{Arc, PoisonError, RwLock};

/// Helper to convert poison errors into KeystoreError
fn handle_poison<T>(_err: PoisonError<T>) -> KeystoreError {
    KeystoreError::Other("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// In-memory keystore
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    ring: Arc<RwLock<KeyRing>>,
}

impl MemoryKeyStore {
    /// Create an empty keystore; every key lookup fails with `KeyUnavailable`
    /// until a pair is installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a keystore already holding `pair`
    pub fn with_key_pair(pair: KeyPair) -> Self {
        let mut ring = KeyRing::new();
        ring.install(pair);
        MemoryKeyStore {
            ring: Arc::new(RwLock::new(ring)),
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn key_ring(&self) -> CryptoResult<KeyRing> {
        Ok(self.ring.read().map_err(handle_poison)?.clone())
    }

    fn install(&self, pair: KeyPair) -> CryptoResult<()> {
        self.ring.write().map_err(handle_poison)?.install(pair);
        Ok(())
    }

    fn import_historical(&self, key: PrivateKey) -> CryptoResult<()> {
        self.ring.write().map_err(handle_poison)?.import_historical(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_crypto::errors::CryptoError;

    #[test]
    fn test_empty_keystore_reports_key_unavailable() {
        let keystore = MemoryKeyStore::new();
        assert!(matches!(keystore.public_key(), Err(CryptoError::KeyUnavailable)));
        assert!(matches!(keystore.private_key(), Err(CryptoError::KeyUnavailable)));
        assert!(matches!(
            keystore.historical_private_keys(),
            Err(CryptoError::KeyUnavailable)
        ));
        assert!(matches!(
            keystore.candidate_private_keys(),
            Err(CryptoError::KeyUnavailable)
        ));
    }

    #[test]
    fn test_ensure_keys_generates_once() {
        let keystore = MemoryKeyStore::new();
        let first = keystore.ensure_keys().unwrap();
        let second = keystore.ensure_keys().unwrap();
        assert_eq!(first, second);
        assert!(keystore.historical_private_keys().unwrap().is_empty());
    }

    #[test]
    fn test_rotate_keeps_old_key_as_candidate() {
        let kp = KeyPair::generate();
        let keystore = MemoryKeyStore::with_key_pair(kp.clone());

        let new_public = keystore.rotate().unwrap();
        assert_ne!(new_public, kp.public_key());

        let candidates = keystore.candidate_private_keys().unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].public_key(), new_public);
        assert_eq!(candidates[1].public_key(), kp.public_key());
    }

    #[test]
    fn test_clones_share_state() {
        let keystore = MemoryKeyStore::new();
        let handle = keystore.clone();
        handle.install(KeyPair::generate()).unwrap();
        assert!(keystore.public_key().is_ok());
    }
}
