//! Messages as returned by the "fetch messages" endpoint

use crate::types::{MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Emoji reaction left on a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub user_id: UserId,
}

/// One direct message
///
/// `content` is opaque to the transport: a JSON string or inline object that
/// only the envelope codec interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    #[serde(default)]
    pub content: Value,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
}

impl ConversationMessage {
    pub fn new(id: MessageId, sender_id: UserId, content: Value) -> Self {
        ConversationMessage {
            id,
            sender_id,
            content,
            timestamp: Timestamp::now(),
            is_deleted: false,
            is_pinned: false,
            reactions: Vec::new(),
            reply_to_id: None,
        }
    }
}
