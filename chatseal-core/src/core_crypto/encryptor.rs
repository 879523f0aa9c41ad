//! Encryptor
//!
//! Produces V2 envelopes: one content key and IV per message, one ciphertext,
//! and one wrapped copy of the key per recipient. The sender is always one of
//! the recipients so their own sent messages stay readable.

use super::errors::{CryptoError, CryptoResult};
use super::primitives::{generate_content_key, seal_content, wrap_key};
use crate::config::{CryptoConfig, MissingKeyPolicy};
use crate::core_envelope::{codec, MessageEnvelope};
use crate::core_keys::{KeyResolver, KeyStore, PublicKey};
use crate::metrics::{record_counter, ENVELOPES_ENCRYPTED, PLAINTEXT_FALLBACKS};
use crate::types::UserId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Encrypt `plaintext` for every entry of `recipient_public_keys`
///
/// The map must already contain the sender's own key; [`Encryptor`]
/// guarantees that.
pub fn encrypt(
    plaintext: &str,
    recipient_public_keys: &BTreeMap<UserId, PublicKey>,
) -> CryptoResult<MessageEnvelope> {
    if recipient_public_keys.is_empty() {
        return Err(CryptoError::InvalidInput("No recipients for envelope".to_string()));
    }

    let content_key = generate_content_key();
    let (iv, ciphertext) = seal_content(&content_key, plaintext.as_bytes())?;

    let mut wrapped_keys = BTreeMap::new();
    for (user_id, public_key) in recipient_public_keys {
        let wrapped = wrap_key(&content_key, public_key, user_id.as_str().as_bytes())?;
        wrapped_keys.insert(user_id.clone(), wrapped);
    }

    record_counter(ENVELOPES_ENCRYPTED, 1);
    Ok(MessageEnvelope {
        ciphertext,
        iv: iv.to_vec(),
        wrapped_keys,
    })
}

/// What the transport should send as the message `content`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingContent {
    /// Serialized V2 envelope
    Encrypted(String),
    /// Plaintext, only produced under [`MissingKeyPolicy::Degrade`]
    Plaintext(String),
}

impl OutgoingContent {
    pub fn as_wire(&self) -> &str {
        match self {
            OutgoingContent::Encrypted(wire) | OutgoingContent::Plaintext(wire) => wire,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, OutgoingContent::Encrypted(_))
    }
}

/// Send-side half of the pipeline for one local user
pub struct Encryptor {
    keystore: Arc<dyn KeyStore>,
    local_user: UserId,
    policy: MissingKeyPolicy,
    max_plaintext_bytes: usize,
}

impl Encryptor {
    pub fn new(keystore: Arc<dyn KeyStore>, local_user: UserId, config: &CryptoConfig) -> Self {
        Encryptor {
            keystore,
            local_user,
            policy: config.missing_key_policy,
            max_plaintext_bytes: config.max_plaintext_bytes,
        }
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    pub fn policy(&self) -> MissingKeyPolicy {
        self.policy
    }

    /// Resolve every participant's key and seal `plaintext` for all of them
    /// plus the sender
    pub async fn seal_for(
        &self,
        plaintext: &str,
        participants: &[UserId],
        resolver: &dyn KeyResolver,
    ) -> CryptoResult<MessageEnvelope> {
        if plaintext.len() > self.max_plaintext_bytes {
            return Err(CryptoError::InvalidInput(format!(
                "Message of {} bytes exceeds limit of {}",
                plaintext.len(),
                self.max_plaintext_bytes
            )));
        }

        let own_key = self.keystore.public_key()?;

        let mut others: Vec<UserId> =
            participants.iter().filter(|id| **id != self.local_user).cloned().collect();
        others.sort();
        others.dedup();

        let resolved = if others.is_empty() {
            Default::default()
        } else {
            resolver.resolve_public_keys(&others).await?
        };

        let mut recipients = BTreeMap::new();
        recipients.insert(self.local_user.clone(), own_key);
        for user_id in others {
            let key = resolved
                .get(&user_id)
                .copied()
                .ok_or_else(|| CryptoError::MissingRecipientKey(user_id.clone()))?;
            recipients.insert(user_id, key);
        }

        debug!(recipients = recipients.len(), "Sealing message");
        encrypt(plaintext, &recipients)
    }

    /// Seal and serialize, applying the configured missing-key policy
    pub async fn prepare_outgoing(
        &self,
        plaintext: &str,
        participants: &[UserId],
        resolver: &dyn KeyResolver,
    ) -> CryptoResult<OutgoingContent> {
        match self.seal_for(plaintext, participants, resolver).await {
            Ok(envelope) => Ok(OutgoingContent::Encrypted(codec::serialize(&envelope)?)),
            Err(e) if e.is_missing_key() && self.policy == MissingKeyPolicy::Degrade => {
                warn!(error = %e, "Sending message unencrypted (missing key policy: degrade)");
                record_counter(PLAINTEXT_FALLBACKS, 1);
                Ok(OutgoingContent::Plaintext(plaintext.to_string()))
            }
            Err(e) => {
                if e.is_missing_key() {
                    warn!(error = %e, "Refusing to send message without encryption");
                }
                Err(e)
            }
        }
    }
}
