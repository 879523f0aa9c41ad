//! Keypair module
//!
//! X25519 key material used to wrap per-message content keys.
//!
//! Public keys travel through the directory as base64 of the raw 32 bytes.
//! Private keys never leave the keystore in exported form; the wrapped
//! `StaticSecret` is zeroized on drop.

use crate::core_crypto::errors::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret, StaticSecret};

/// Length of raw X25519 keys
pub const KEY_LEN: usize = 32;

/// Recipient public key (raw X25519 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        PublicKey(bytes)
    }

    /// Parse raw key bytes of unchecked length
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let raw: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidInput(format!(
                "Public key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(PublicKey(raw))
    }

    /// Parse the directory's exported form
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidInput(format!("Invalid base64 public key: {}", e)))?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Short hex digest for logs
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }

    pub(crate) fn to_x25519(self) -> X25519PublicKey {
        X25519PublicKey::from(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.fingerprint()).finish()
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        PublicKey::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Local private key
#[derive(Clone)]
pub struct PrivateKey(StaticSecret);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        PrivateKey(StaticSecret::from(bytes))
    }

    /// Raw secret bytes, for the keystore's at-rest format only
    pub(crate) fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(X25519PublicKey::from(&self.0).to_bytes())
    }

    pub(crate) fn diffie_hellman(&self, their_public: &X25519PublicKey) -> SharedSecret {
        self.0.diffie_hellman(their_public)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public_key().fingerprint())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Asymmetric key pair owned by the local user
#[derive(Clone, Debug)]
pub struct KeyPair {
    public: PublicKey,
    private: PrivateKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the thread-local CSPRNG
    pub fn generate() -> Self {
        let mut secret_bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut secret_bytes);
        let pair = Self::from_private(PrivateKey::from_bytes(secret_bytes));
        zeroize::Zeroize::zeroize(&mut secret_bytes);
        pair
    }

    pub fn from_private(private: PrivateKey) -> Self {
        KeyPair {
            public: private.public_key(),
            private,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_distinct_keys() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_public_key_matches_private() {
        let kp = KeyPair::generate();
        assert_eq!(kp.private_key().public_key(), kp.public_key());
    }

    #[test]
    fn test_base64_export_roundtrip() {
        let kp = KeyPair::generate();
        let exported = kp.public_key().to_base64();
        let imported = PublicKey::from_base64(&exported).unwrap();
        assert_eq!(imported, kp.public_key());
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        let result = PublicKey::from_slice(&[0u8; 31]);
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));

        let result = PublicKey::from_base64("not base64!!");
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let kp = KeyPair::generate();
        let debug = format!("{:?}", kp.private_key());
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&hex::encode(kp.private_key().to_bytes())));
    }

    #[test]
    fn test_public_key_serde_is_base64_string() {
        let kp = KeyPair::generate();
        let json = serde_json::to_string(&kp.public_key()).unwrap();
        assert_eq!(json, format!("\"{}\"", kp.public_key().to_base64()));

        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kp.public_key());
    }
}
