//! Recipient public key resolution
//!
//! The backend owns the userId → public key mapping. The pipeline only sees
//! it through [`KeyResolver`]; entries the resolver does not return are
//! treated as missing recipient keys by the encryptor.

use crate::core_crypto::errors::{CryptoError, CryptoResult};
use crate::core_keys::keypair::PublicKey;
use crate::types::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::trace;

/// Source of recipient public keys (REST backend in production)
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Resolve as many of `user_ids` as possible; unknown users are simply
    /// absent from the returned map
    async fn resolve_public_keys(
        &self,
        user_ids: &[UserId],
    ) -> CryptoResult<HashMap<UserId, PublicKey>>;
}

fn handle_poison<T>(_err: PoisonError<T>) -> CryptoError {
    CryptoError::KeyStore("Directory lock poisoned".to_string())
}

/// In-memory public key directory
///
/// Used as a client-side cache in front of the backend and as the resolver
/// in tests and the CLI.
#[derive(Default)]
pub struct PublicKeyDirectory {
    entries: RwLock<HashMap<UserId, PublicKey>>,
}

impl PublicKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the key published by `user_id`
    pub fn insert(&self, user_id: UserId, key: PublicKey) -> CryptoResult<Option<PublicKey>> {
        Ok(self.entries.write().map_err(handle_poison)?.insert(user_id, key))
    }

    /// Drop a stale entry so the next resolution reports it missing
    pub fn remove(&self, user_id: &UserId) -> CryptoResult<Option<PublicKey>> {
        Ok(self.entries.write().map_err(handle_poison)?.remove(user_id))
    }

    pub fn get(&self, user_id: &UserId) -> CryptoResult<Option<PublicKey>> {
        Ok(self.entries.read().map_err(handle_poison)?.get(user_id).copied())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyResolver for PublicKeyDirectory {
    async fn resolve_public_keys(
        &self,
        user_ids: &[UserId],
    ) -> CryptoResult<HashMap<UserId, PublicKey>> {
        let entries = self.entries.read().map_err(handle_poison)?;
        let resolved: HashMap<UserId, PublicKey> = user_ids
            .iter()
            .filter_map(|id| entries.get(id).map(|key| (id.clone(), *key)))
            .collect();
        trace!(requested = user_ids.len(), resolved = resolved.len(), "Resolved public keys");
        Ok(resolved)
    }
}
