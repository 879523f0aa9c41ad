//! Error types for the encryption pipeline

use crate::types::UserId;
use thiserror::Error;

/// Result type for pipeline operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while encrypting, decrypting or loading keys
///
/// None of these are shown to the user directly. Callers map them to a
/// placeholder (decrypt side) or to the configured missing-key policy
/// (send side) and log the underlying error.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No local key material has been generated or loaded yet
    #[error("Local key material unavailable")]
    KeyUnavailable,

    /// A participant's public key could not be resolved
    #[error("Missing public key for recipient {0}")]
    MissingRecipientKey(UserId),

    /// Wrong key, corrupt ciphertext or unsupported version
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Content could not be parsed as any known envelope
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Key backend failure (IO, storage encryption)
    #[error("Keystore error: {0}")]
    KeyStore(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CryptoError {
    /// Whether the send path may degrade to plaintext for this error
    pub fn is_missing_key(&self) -> bool {
        matches!(self, CryptoError::KeyUnavailable | CryptoError::MissingRecipientKey(_))
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(e: serde_json::Error) -> Self {
        CryptoError::Serialization(e.to_string())
    }
}
