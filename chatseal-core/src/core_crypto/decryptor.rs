//! Decryptor
//!
//! Turns a received message into displayable content. Precedence is strict:
//!
//! 1. `isDeleted` -> [`DecryptedContent::Deleted`], content is not inspected
//! 2. system event -> [`DecryptedContent::System`], never decrypted
//! 3. V2 / legacy V1 envelope -> decrypted text or `Undecryptable`
//! 4. anything else -> plaintext as-is
//!
//! Failures are per message: they are logged and become placeholders, they
//! never propagate to the caller rendering a conversation.

use super::errors::{CryptoError, CryptoResult};
use super::primitives::{open_content, unwrap_key};
use crate::core_conversation::message::ConversationMessage;
use crate::core_envelope::{codec, LegacyPacket, MessageEnvelope, ParsedContent, SystemEvent};
use crate::core_keys::{KeyStore, PrivateKey};
use crate::metrics::{
    record_counter, DECRYPT_FAILURES, ENVELOPES_DECRYPTED, LEGACY_FALLBACK_ATTEMPTS,
};
use crate::types::UserId;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Decrypt a V2 envelope with the local user's private key
pub fn decrypt(
    envelope: &MessageEnvelope,
    local_user: &UserId,
    private_key: &PrivateKey,
) -> CryptoResult<String> {
    let wrapped = envelope.wrapped_key_for(local_user).ok_or_else(|| {
        CryptoError::DecryptionFailed(format!("No wrapped key for {}", local_user))
    })?;

    let content_key = unwrap_key(wrapped, private_key, local_user.as_str().as_bytes())?;
    let plaintext = open_content(&content_key, &envelope.iv, &envelope.ciphertext)?;
    into_text(plaintext)
}

/// Decrypt a legacy V1 packet, trying each candidate key in order
///
/// Returns the first success; fails only once every candidate has failed.
pub fn decrypt_with_fallback(
    packet: &LegacyPacket,
    candidate_keys: &[PrivateKey],
) -> CryptoResult<String> {
    for (index, key) in candidate_keys.iter().enumerate() {
        record_counter(LEGACY_FALLBACK_ATTEMPTS, 1);
        match decrypt_legacy(packet, key) {
            Ok(text) => {
                trace!(candidate = index, "Legacy packet decrypted");
                return Ok(text);
            }
            Err(e) => debug!(candidate = index, error = %e, "Legacy candidate key failed"),
        }
    }

    Err(CryptoError::DecryptionFailed(format!(
        "No matching key among {} candidates",
        candidate_keys.len()
    )))
}

fn decrypt_legacy(packet: &LegacyPacket, key: &PrivateKey) -> CryptoResult<String> {
    let content_key = unwrap_key(&packet.key, key, b"")?;
    let plaintext = open_content(&content_key, &packet.iv, &packet.data)?;
    into_text(plaintext)
}

fn into_text(bytes: Vec<u8>) -> CryptoResult<String> {
    String::from_utf8(bytes)
        .map_err(|_| CryptoError::DecryptionFailed("Plaintext is not valid UTF-8".to_string()))
}

/// Displayable form of one message, as stored in the decrypted-content cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptedContent {
    Text(String),
    Deleted,
    Undecryptable,
    System(SystemEvent),
}

impl DecryptedContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecryptedContent::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Receive-side half of the pipeline for one local user
pub struct Decryptor {
    keystore: Arc<dyn KeyStore>,
    local_user: UserId,
    attempts: AtomicU64,
}

impl Decryptor {
    pub fn new(keystore: Arc<dyn KeyStore>, local_user: UserId) -> Self {
        Decryptor {
            keystore,
            local_user,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Number of envelopes this decryptor has tried to open
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Classify and, if needed, decrypt a message
    pub fn open(&self, message: &ConversationMessage) -> DecryptedContent {
        if message.is_deleted {
            return DecryptedContent::Deleted;
        }
        self.open_content(&message.content)
    }

    /// Classify and decrypt a bare `content` value
    pub fn open_content(&self, content: &Value) -> DecryptedContent {
        self.open_parsed(codec::parse(content))
    }

    pub fn open_parsed(&self, parsed: ParsedContent) -> DecryptedContent {
        let result = match parsed {
            ParsedContent::System(event) => return DecryptedContent::System(event),
            ParsedContent::Plaintext(text) => return DecryptedContent::Text(text),
            ParsedContent::V2(envelope) => self.try_envelope(&envelope),
            ParsedContent::LegacyV1(packet) => self.try_legacy(&packet),
        };

        match result {
            Ok(text) => {
                record_counter(ENVELOPES_DECRYPTED, 1);
                DecryptedContent::Text(text)
            }
            Err(e) => {
                record_counter(DECRYPT_FAILURES, 1);
                warn!(error = %e, user = %self.local_user, "Message could not be decrypted");
                DecryptedContent::Undecryptable
            }
        }
    }

    /// Current key first, then retired keys after rotation
    fn try_envelope(&self, envelope: &MessageEnvelope) -> CryptoResult<String> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let candidates = self.keystore.candidate_private_keys()?;

        let mut last_error = None;
        for key in &candidates {
            match decrypt(envelope, &self.local_user, key) {
                Ok(text) => return Ok(text),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or(CryptoError::KeyUnavailable))
    }

    fn try_legacy(&self, packet: &LegacyPacket) -> CryptoResult<String> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let candidates = self.keystore.candidate_private_keys()?;
        decrypt_with_fallback(packet, &candidates)
    }
}
