//! Test fixtures for creating common test objects

use crate::config::CryptoConfig;
use crate::core_conversation::ConversationMessage;
use crate::core_crypto::primitives::{generate_content_key, seal_content, wrap_key};
use crate::core_crypto::{encrypt, CryptoResult, Decryptor, Encryptor};
use crate::core_envelope::{codec, LegacyPacket, SystemAction, SystemEvent};
use crate::core_keys::{KeyPair, KeyStore, MemoryKeyStore, PublicKey, PublicKeyDirectory};
use crate::types::{MessageId, UserId};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Build a V1 packet the way older clients did: one wrapped key, no AAD
pub fn legacy_packet(plaintext: &str, recipient: &PublicKey) -> CryptoResult<LegacyPacket> {
    let content_key = generate_content_key();
    let (iv, data) = seal_content(&content_key, plaintext.as_bytes())?;
    let key = wrap_key(&content_key, recipient, b"")?;
    Ok(LegacyPacket {
        data,
        key,
        iv: iv.to_vec(),
    })
}

/// A named user with a fresh key pair in an in-memory keystore
pub struct TestUser {
    pub id: UserId,
    pub keystore: Arc<MemoryKeyStore>,
}

impl TestUser {
    pub fn new(id: &str) -> Self {
        TestUser {
            id: UserId::from(id),
            keystore: Arc::new(MemoryKeyStore::with_key_pair(KeyPair::generate())),
        }
    }

    /// User whose keystore has no key pair yet
    pub fn without_keys(id: &str) -> Self {
        TestUser {
            id: UserId::from(id),
            keystore: Arc::new(MemoryKeyStore::new()),
        }
    }

    pub fn public_key(&self) -> CryptoResult<PublicKey> {
        self.keystore.public_key()
    }

    pub fn decryptor(&self) -> Decryptor {
        Decryptor::new(self.keystore.clone(), self.id.clone())
    }

    pub fn encryptor(&self, config: &CryptoConfig) -> Encryptor {
        Encryptor::new(self.keystore.clone(), self.id.clone(), config)
    }
}

/// Directory pre-filled with the public keys of `users` that have one
pub fn directory_for(users: &[&TestUser]) -> CryptoResult<PublicKeyDirectory> {
    let directory = PublicKeyDirectory::new();
    for user in users {
        if let Ok(public_key) = user.public_key() {
            directory.insert(user.id.clone(), public_key)?;
        }
    }
    Ok(directory)
}

/// Serialized V2 envelope of `plaintext` for `recipients`
pub fn encrypted_content(plaintext: &str, recipients: &[&TestUser]) -> CryptoResult<String> {
    let mut keys = BTreeMap::new();
    for user in recipients {
        keys.insert(user.id.clone(), user.public_key()?);
    }
    codec::serialize(&encrypt(plaintext, &keys)?)
}

pub fn text_message(id: &str, sender: &str, text: &str) -> ConversationMessage {
    ConversationMessage::new(MessageId::from(id), UserId::from(sender), Value::String(text.into()))
}

pub fn encrypted_message(
    id: &str,
    sender: &TestUser,
    plaintext: &str,
    recipients: &[&TestUser],
) -> CryptoResult<ConversationMessage> {
    let content = encrypted_content(plaintext, recipients)?;
    Ok(ConversationMessage::new(MessageId::from(id), sender.id.clone(), Value::String(content)))
}

pub fn legacy_message(
    id: &str,
    sender: &str,
    plaintext: &str,
    recipient: &PublicKey,
) -> CryptoResult<ConversationMessage> {
    let value = codec::legacy_to_value(&legacy_packet(plaintext, recipient)?)?;
    Ok(ConversationMessage::new(MessageId::from(id), UserId::from(sender), value))
}

/// Inline system event object, as the backend stores pin/unpin activity
pub fn system_message(
    id: &str,
    actor: &str,
    action: SystemAction,
) -> CryptoResult<ConversationMessage> {
    let event = SystemEvent::new(action, UserId::from(actor));
    let value = codec::system_event_to_value(&event)?;
    Ok(ConversationMessage::new(MessageId::from(id), UserId::from(actor), value))
}

pub fn deleted(mut message: ConversationMessage) -> ConversationMessage {
    message.is_deleted = true;
    message
}
