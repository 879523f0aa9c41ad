//! File-based keystore with encryption at rest
//!
//! Encrypted File Format:
//! ```text
//! [Magic: 8 bytes "CSKR0001"]
//! [Version: 1 byte]
//! [Salt: 16 bytes]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! Without a password the ring is written behind an `CSKR_RAW` marker so a
//! later load with a password fails loudly instead of misreading the file.

use super::{KeyRing, KeyStore, KeystoreError, StoredKeyRing};
use crate::core_crypto::errors::CryptoResult;
use crate::core_keys::keypair::{KeyPair, PrivateKey};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use zeroize::Zeroizing;

/// Magic header for encrypted key ring files
const MAGIC_HEADER: &[u8; 8] = b"CSKR0001";

/// Magic header for unencrypted key ring files
const RAW_HEADER: &[u8; 8] = b"CSKR_RAW";

/// Current keystore format version
const FORMAT_VERSION: u8 = 1;

/// Salt length for Argon2 KDF (16 bytes = 128 bits)
const SALT_LEN: usize = 16;

/// Nonce length for AES-GCM (12 bytes = 96 bits)
const NONCE_LEN: usize = 12;

/// Header size: magic(8) + version(1) + salt(16) + nonce(12) = 37 bytes
const HEADER_SIZE: usize = 8 + 1 + SALT_LEN + NONCE_LEN;

fn handle_poison<T>(_err: PoisonError<T>) -> KeystoreError {
    KeystoreError::Other("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// Key ring persisted to a single file
pub struct FileKeyStore {
    path: PathBuf,
    password: Option<Zeroizing<String>>,
    ring: RwLock<KeyRing>,
}

impl FileKeyStore {
    /// Open the key ring at `path`, loading it if the file exists
    pub fn open(path: impl Into<PathBuf>, password: Option<&str>) -> Result<Self, KeystoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let store = FileKeyStore {
            path,
            password: password.map(|p| Zeroizing::new(p.to_string())),
            ring: RwLock::new(KeyRing::new()),
        };

        if store.path.exists() {
            let data = fs::read(&store.path)?;
            let plaintext = Zeroizing::new(store.decrypt(&data)?);
            let stored: StoredKeyRing = bincode::deserialize(&plaintext)
                .map_err(|e| KeystoreError::Serialization(e.to_string()))?;
            *store.ring.write().map_err(handle_poison)? = KeyRing::from_stored(&stored);
            debug!(path = %store.path.display(), "Loaded key ring");
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, ring: &KeyRing) -> Result<(), KeystoreError> {
        let stored = ring.to_stored();
        let serialized = Zeroizing::new(
            bincode::serialize(&stored).map_err(|e| KeystoreError::Serialization(e.to_string()))?,
        );
        let encrypted = self.encrypt(&serialized)?;
        self.write_atomic(&encrypted)
    }

    /// Encrypt data with AEAD (AES-256-GCM)
    ///
    /// Returns: [magic][version][salt][nonce][ciphertext+tag]
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, KeystoreError> {
        let Some(password) = &self.password else {
            let mut result = Vec::with_capacity(9 + data.len());
            result.extend_from_slice(RAW_HEADER);
            result.push(FORMAT_VERSION);
            result.extend_from_slice(data);
            return Ok(result);
        };

        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        let key = derive_key_from_password(password, &salt)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| KeystoreError::Encryption(format!("Invalid key: {}", e)))?;
        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| KeystoreError::Encryption(format!("Encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        result.extend_from_slice(MAGIC_HEADER);
        result.push(FORMAT_VERSION);
        result.extend_from_slice(&salt);
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt data written by [`Self::encrypt`]
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, KeystoreError> {
        if data.len() < 9 {
            return Err(KeystoreError::Decryption("File too short".to_string()));
        }

        if &data[0..8] == RAW_HEADER {
            if self.password.is_some() {
                return Err(KeystoreError::Decryption(
                    "Encrypted keystore expected, found unencrypted".to_string(),
                ));
            }
            return Ok(data[9..].to_vec());
        }

        if &data[0..8] != MAGIC_HEADER {
            return Err(KeystoreError::Decryption("Invalid magic header".to_string()));
        }

        let version = data[8];
        if version != FORMAT_VERSION {
            return Err(KeystoreError::Decryption(format!("Unsupported version: {}", version)));
        }

        // 16 is the AEAD tag size
        if data.len() < HEADER_SIZE + 16 {
            return Err(KeystoreError::Decryption("Truncated file".to_string()));
        }

        let Some(password) = &self.password else {
            return Err(KeystoreError::Decryption("Password required to decrypt".to_string()));
        };

        let salt = &data[9..9 + SALT_LEN];
        let nonce = Nonce::from_slice(&data[9 + SALT_LEN..HEADER_SIZE]);
        let ciphertext = &data[HEADER_SIZE..];

        let key = derive_key_from_password(password, salt)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| KeystoreError::Decryption(format!("Invalid key: {}", e)))?;

        // tag mismatch = wrong password or corrupted file
        cipher.decrypt(nonce, ciphertext).map_err(|_| KeystoreError::InvalidPassword)
    }

    /// Write file atomically (write to temp, then rename)
    fn write_atomic(&self, data: &[u8]) -> Result<(), KeystoreError> {
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, data)?;
        fs::rename(temp_path, &self.path)?;
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn key_ring(&self) -> CryptoResult<KeyRing> {
        Ok(self.ring.read().map_err(handle_poison)?.clone())
    }

    fn install(&self, pair: KeyPair) -> CryptoResult<()> {
        let mut ring = self.ring.write().map_err(handle_poison)?;
        let mut updated = ring.clone();
        updated.install(pair);
        self.persist(&updated)?;
        *ring = updated;
        Ok(())
    }

    fn import_historical(&self, key: PrivateKey) -> CryptoResult<()> {
        let mut ring = self.ring.write().map_err(handle_poison)?;
        let mut updated = ring.clone();
        updated.import_historical(key);
        self.persist(&updated)?;
        *ring = updated;
        Ok(())
    }
}

/// Derive 256-bit encryption key from password using Argon2id
fn derive_key_from_password(
    password: &str,
    salt: &[u8],
) -> Result<Zeroizing<[u8; 32]>, KeystoreError> {
    let params = Params::new(
        19 * 1024, // 19 MiB memory cost
        2,         // 2 iterations
        1,         // 1 lane
        Some(32),
    )
    .map_err(|e| KeystoreError::Encryption(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, key.as_mut_slice())
        .map_err(|e| KeystoreError::Encryption(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_crypto::errors::CryptoError;
    use tempfile::TempDir;

    #[test]
    fn test_keys_survive_reopen_with_password() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.bin.enc");

        let keystore = FileKeyStore::open(&path, Some("password123")).unwrap();
        let public = keystore.ensure_keys().unwrap();
        drop(keystore);

        let reopened = FileKeyStore::open(&path, Some("password123")).unwrap();
        assert_eq!(reopened.public_key().unwrap(), public);
    }

    #[test]
    fn test_history_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.bin");

        let keystore = FileKeyStore::open(&path, None).unwrap();
        let first = keystore.ensure_keys().unwrap();
        let second = keystore.rotate().unwrap();
        drop(keystore);

        let reopened = FileKeyStore::open(&path, None).unwrap();
        assert_eq!(reopened.public_key().unwrap(), second);
        let history = reopened.historical_private_keys().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].public_key(), first);
    }

    #[test]
    fn test_missing_file_is_empty_ring() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = FileKeyStore::open(temp_dir.path().join("none.bin"), None).unwrap();
        assert!(matches!(keystore.private_key(), Err(CryptoError::KeyUnavailable)));
    }

    #[test]
    fn test_wrong_password_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.bin.enc");

        let keystore = FileKeyStore::open(&path, Some("correct horse")).unwrap();
        keystore.ensure_keys().unwrap();

        let result = FileKeyStore::open(&path, Some("battery staple"));
        assert!(matches!(result, Err(KeystoreError::InvalidPassword)));
    }

    #[test]
    fn test_unencrypted_file_refused_when_password_given() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.bin");

        FileKeyStore::open(&path, None).unwrap().ensure_keys().unwrap();

        let result = FileKeyStore::open(&path, Some("password123"));
        assert!(matches!(result, Err(KeystoreError::Decryption(_))));
    }

    #[test]
    fn test_corrupted_ciphertext() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.bin.enc");

        FileKeyStore::open(&path, Some("password123")).unwrap().ensure_keys().unwrap();

        let mut encrypted = fs::read(&path).unwrap();
        encrypted[HEADER_SIZE + 4] ^= 0xFF;
        fs::write(&path, &encrypted).unwrap();

        let result = FileKeyStore::open(&path, Some("password123"));
        assert!(matches!(result, Err(KeystoreError::InvalidPassword)));
    }

    #[test]
    fn test_invalid_magic_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.bin.enc");
        fs::write(&path, b"NOTAKEYRINGFILE-----------------------------------").unwrap();

        let result = FileKeyStore::open(&path, Some("password123"));
        assert!(matches!(result, Err(KeystoreError::Decryption(_))));
    }
}
