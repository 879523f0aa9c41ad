//! In-memory forms of the message content variants

use super::b64;
use crate::types::{MessageId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire tag of the legacy single-key packet
pub const LEGACY_VERSION: &str = "1";

/// Wire tag of the multi-recipient envelope
pub const ENVELOPE_VERSION: &str = "2";

/// Multi-recipient hybrid envelope (V2)
///
/// One AES-256-GCM ciphertext; the content key is wrapped once per recipient,
/// sender included. Every entry in `wrapped_keys` protects the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,

    #[serde(with = "b64")]
    pub iv: Vec<u8>,

    #[serde(rename = "keys", with = "b64::map")]
    pub wrapped_keys: BTreeMap<UserId, Vec<u8>>,
}

impl MessageEnvelope {
    pub fn recipients(&self) -> impl Iterator<Item = &UserId> {
        self.wrapped_keys.keys()
    }

    pub fn wrapped_key_for(&self, user_id: &UserId) -> Option<&[u8]> {
        self.wrapped_keys.get(user_id).map(Vec::as_slice)
    }
}

/// Legacy single wrapped-key packet (V1), read-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyPacket {
    /// AES-GCM ciphertext of the message
    #[serde(with = "b64")]
    pub data: Vec<u8>,

    /// Content key wrapped under one of the user's (possibly retired) keys
    #[serde(with = "b64")]
    pub key: Vec<u8>,

    #[serde(with = "b64")]
    pub iv: Vec<u8>,
}

/// Activity recorded in the conversation by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemAction {
    Pin,
    Unpin,
    /// Any action this client does not render specially
    Other,
}

impl<'de> Deserialize<'de> for SystemAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let action = String::deserialize(deserializer)?;
        Ok(match action.as_str() {
            "pin" => SystemAction::Pin,
            "unpin" => SystemAction::Unpin,
            _ => SystemAction::Other,
        })
    }
}

/// `{type: "system", action, actorId}` content; never encrypted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEvent {
    pub action: SystemAction,
    pub actor_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

impl SystemEvent {
    pub fn new(action: SystemAction, actor_id: UserId) -> Self {
        SystemEvent {
            action,
            actor_id,
            message_id: None,
        }
    }

    /// Activity line, e.g. "alice pinned a message"
    pub fn describe(&self, actor_name: &str) -> String {
        match self.action {
            SystemAction::Pin => format!("{} pinned a message", actor_name),
            SystemAction::Unpin => format!("{} unpinned a message", actor_name),
            SystemAction::Other => format!("{} updated the conversation", actor_name),
        }
    }
}

/// Result of classifying a raw content field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedContent {
    Plaintext(String),
    System(SystemEvent),
    LegacyV1(LegacyPacket),
    V2(MessageEnvelope),
}

impl ParsedContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            ParsedContent::Plaintext(_) => ContentKind::Plaintext,
            ParsedContent::System(_) => ContentKind::System,
            ParsedContent::LegacyV1(_) => ContentKind::LegacyV1,
            ParsedContent::V2(_) => ContentKind::V2,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, ParsedContent::LegacyV1(_) | ParsedContent::V2(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Plaintext,
    System,
    LegacyV1,
    V2,
}
