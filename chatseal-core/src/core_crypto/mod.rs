//! Hybrid message encryption
//!
//! AES-256-GCM for message bodies, X25519 + HKDF-SHA256 key wrapping for
//! per-recipient access to the content key.

pub mod decryptor;
pub mod encryptor;
pub mod errors;
pub mod primitives;

pub use decryptor::{decrypt, decrypt_with_fallback, DecryptedContent, Decryptor};
pub use encryptor::{encrypt, Encryptor, OutgoingContent};
pub use errors::{CryptoError, CryptoResult};
