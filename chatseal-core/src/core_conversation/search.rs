//! Full-text search over decrypted content
//!
//! Search only ever looks at cached plaintext. Messages without a cache
//! entry, deleted or undecryptable messages, and system events never match.
//! A message flagged `is_deleted` never matches even while its pre-deletion
//! plaintext is still cached, mirroring rendering.

use super::cache::DecryptedCache;
use super::message::ConversationMessage;
use crate::core_crypto::decryptor::DecryptedContent;

/// Case-insensitive substring match against decrypted text
pub fn matches(content: &DecryptedContent, query: &str) -> bool {
    match content {
        DecryptedContent::Text(text) => text.to_lowercase().contains(&query.to_lowercase()),
        _ => false,
    }
}

impl DecryptedCache {
    /// Filter `messages` (in order) by `query`; a blank query keeps everything
    pub fn search<'a>(
        &self,
        messages: &'a [ConversationMessage],
        query: &str,
    ) -> Vec<&'a ConversationMessage> {
        let query = query.trim();
        if query.is_empty() {
            return messages.iter().collect();
        }

        messages
            .iter()
            .filter(|m| !m.is_deleted)
            .filter(|m| {
                self.entries()
                    .get(&m.id)
                    .is_some_and(|content| matches(content, query))
            })
            .collect()
    }
}
