//! Symmetric content encryption and per-recipient key wrapping
//!
//! - Content: AES-256-GCM with a fresh random 256-bit key and 96-bit IV
//! - Key wrap: ephemeral X25519 ECDH against the recipient's public key,
//!   HKDF-SHA256 to an AES-256-GCM key, which seals the content key
//!
//! Wrapped key layout: `ephemeral_pk (32) || nonce (12) || ciphertext (32 + 16 tag)`

use super::errors::{CryptoError, CryptoResult};
use crate::core_keys::keypair::{PrivateKey, PublicKey, KEY_LEN};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Size of the content key (256 bits for AES-256-GCM)
pub const CONTENT_KEY_SIZE: usize = 32;

/// Size of nonce/IV (96 bits for AES-GCM)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM tag length
const TAG_SIZE: usize = 16;

/// Exact length of a wrapped content key
pub const WRAPPED_KEY_SIZE: usize = KEY_LEN + NONCE_SIZE + CONTENT_KEY_SIZE + TAG_SIZE;

/// HKDF info label for wrapping keys
const WRAP_KEY_LABEL: &[u8] = b"chatseal key wrap v1";

pub type ContentKey = Zeroizing<[u8; CONTENT_KEY_SIZE]>;

/// Fresh random content key
pub fn generate_content_key() -> ContentKey {
    let mut key = Zeroizing::new([0u8; CONTENT_KEY_SIZE]);
    rand::rng().fill_bytes(key.as_mut_slice());
    key
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `key` with a fresh IV; returns (iv, ciphertext)
pub fn seal_content(
    key: &ContentKey,
    plaintext: &[u8],
) -> CryptoResult<([u8; NONCE_SIZE], Vec<u8>)> {
    let iv = random_nonce();
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::InvalidInput(format!("Content encryption failed: {}", e)))?;
    Ok((iv, ciphertext))
}

/// Decrypt content sealed by [`seal_content`]
pub fn open_content(key: &ContentKey, iv: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if iv.len() != NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed(format!(
            "Invalid IV length: expected {}, got {}",
            NONCE_SIZE,
            iv.len()
        )));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("Content authentication failed".to_string()))
}

fn derive_wrapping_key(shared_secret: &[u8]) -> CryptoResult<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(WRAP_KEY_LABEL, key.as_mut_slice())
        .map_err(|e| CryptoError::InvalidInput(format!("HKDF expand failed: {}", e)))?;
    Ok(key)
}

/// Wrap `content_key` for the holder of `recipient`'s private key
///
/// `aad` binds the wrapped key to its context (the recipient's user id for
/// V2 envelopes).
pub fn wrap_key(
    content_key: &ContentKey,
    recipient: &PublicKey,
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    let mut ephemeral_bytes = Zeroizing::new([0u8; KEY_LEN]);
    rand::rng().fill_bytes(ephemeral_bytes.as_mut_slice());
    let ephemeral_sk = StaticSecret::from(*ephemeral_bytes);
    let ephemeral_pk = X25519PublicKey::from(&ephemeral_sk);

    let shared_secret = ephemeral_sk.diffie_hellman(&recipient.to_x25519());
    let key = derive_wrapping_key(shared_secret.as_bytes())?;

    let nonce_bytes = random_nonce();
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: content_key.as_slice(),
                aad,
            },
        )
        .map_err(|e| CryptoError::InvalidInput(format!("Key wrap failed: {}", e)))?;

    let mut wrapped = Vec::with_capacity(WRAPPED_KEY_SIZE);
    wrapped.extend_from_slice(ephemeral_pk.as_bytes());
    wrapped.extend_from_slice(&nonce_bytes);
    wrapped.append(&mut sealed);
    Ok(wrapped)
}

/// Recover a content key wrapped by [`wrap_key`]
pub fn unwrap_key(
    wrapped: &[u8],
    private_key: &PrivateKey,
    aad: &[u8],
) -> CryptoResult<ContentKey> {
    if wrapped.len() != WRAPPED_KEY_SIZE {
        return Err(CryptoError::DecryptionFailed(format!(
            "Wrapped key has length {}, expected {}",
            wrapped.len(),
            WRAPPED_KEY_SIZE
        )));
    }

    let mut ephemeral_bytes = [0u8; KEY_LEN];
    ephemeral_bytes.copy_from_slice(&wrapped[..KEY_LEN]);
    let ephemeral_pk = X25519PublicKey::from(ephemeral_bytes);
    let nonce = Nonce::from_slice(&wrapped[KEY_LEN..KEY_LEN + NONCE_SIZE]);
    let sealed = &wrapped[KEY_LEN + NONCE_SIZE..];

    let shared_secret = private_key.diffie_hellman(&ephemeral_pk);
    let key = derive_wrapping_key(shared_secret.as_bytes())?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
    let opened = Zeroizing::new(
        cipher
            .decrypt(nonce, Payload { msg: sealed, aad })
            .map_err(|_| CryptoError::DecryptionFailed("Key unwrap failed".to_string()))?,
    );

    let mut content_key = Zeroizing::new([0u8; CONTENT_KEY_SIZE]);
    content_key.copy_from_slice(&opened);
    Ok(content_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_keys::keypair::KeyPair;

    #[test]
    fn test_content_seal_open() {
        let key = generate_content_key();
        let (iv, ciphertext) = seal_content(&key, b"Secret message").unwrap();
        let plaintext = open_content(&key, &iv, &ciphertext).unwrap();
        assert_eq!(plaintext, b"Secret message");
    }

    #[test]
    fn test_content_wrong_iv_length() {
        let key = generate_content_key();
        let (_, ciphertext) = seal_content(&key, b"x").unwrap();
        let result = open_content(&key, &[0u8; 8], &ciphertext);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_content_tampered_ciphertext() {
        let key = generate_content_key();
        let (iv, mut ciphertext) = seal_content(&key, b"hello").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(open_content(&key, &iv, &ciphertext).is_err());
    }

    #[test]
    fn test_wrap_unwrap() {
        let recipient = KeyPair::generate();
        let content_key = generate_content_key();

        let wrapped = wrap_key(&content_key, &recipient.public_key(), b"bob").unwrap();
        assert_eq!(wrapped.len(), WRAPPED_KEY_SIZE);

        let unwrapped = unwrap_key(&wrapped, recipient.private_key(), b"bob").unwrap();
        assert_eq!(*unwrapped, *content_key);
    }

    #[test]
    fn test_unwrap_wrong_recipient() {
        let recipient = KeyPair::generate();
        let stranger = KeyPair::generate();
        let content_key = generate_content_key();

        let wrapped = wrap_key(&content_key, &recipient.public_key(), b"").unwrap();
        let result = unwrap_key(&wrapped, stranger.private_key(), b"");
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_unwrap_wrong_aad() {
        let recipient = KeyPair::generate();
        let content_key = generate_content_key();

        let wrapped = wrap_key(&content_key, &recipient.public_key(), b"bob").unwrap();
        assert!(unwrap_key(&wrapped, recipient.private_key(), b"mallory").is_err());
    }

    #[test]
    fn test_unwrap_truncated() {
        let recipient = KeyPair::generate();
        let result = unwrap_key(&[0u8; 5], recipient.private_key(), b"");
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_wrapping_is_randomized() {
        let recipient = KeyPair::generate();
        let content_key = generate_content_key();
        let a = wrap_key(&content_key, &recipient.public_key(), b"").unwrap();
        let b = wrap_key(&content_key, &recipient.public_key(), b"").unwrap();
        assert_ne!(a, b);
    }
}
