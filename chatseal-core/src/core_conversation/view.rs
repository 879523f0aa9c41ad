//! Conversation view state
//!
//! Owns the decrypted-content cache for the conversation on screen and runs
//! reconciliation passes over the loaded message list. Rendering and search
//! both read from the same cache.

use super::cache::{CacheError, DecryptedCache};
use super::message::ConversationMessage;
use crate::config::{Config, DisplayConfig};
use crate::core_crypto::decryptor::{DecryptedContent, Decryptor};
use crate::types::{ConversationId, MessageId, UserId};
use std::sync::Arc;
use tracing::debug;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Messages that had no cache entry at plan time
    pub planned: usize,
    /// Entries actually added at commit
    pub committed: usize,
}

pub struct ConversationView {
    cache: DecryptedCache,
    decryptor: Arc<Decryptor>,
    display: DisplayConfig,
    yield_every: usize,
}

impl ConversationView {
    pub fn new(
        conversation_id: ConversationId,
        decryptor: Arc<Decryptor>,
        config: &Config,
    ) -> Self {
        ConversationView {
            cache: DecryptedCache::new(conversation_id),
            decryptor,
            display: config.display.clone(),
            yield_every: config.cache.yield_every,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        self.cache.conversation_id()
    }

    pub fn cache(&self) -> &DecryptedCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut DecryptedCache {
        &mut self.cache
    }

    pub fn decryptor(&self) -> &Arc<Decryptor> {
        &self.decryptor
    }

    /// Decrypt every loaded message that has no cache entry yet and commit
    /// the results in one step
    pub async fn reconcile(
        &mut self,
        messages: &[ConversationMessage],
    ) -> Result<ReconcileReport, CacheError> {
        let batch = self.cache.plan(messages);
        let planned = batch.len();
        if batch.is_empty() {
            return Ok(ReconcileReport {
                planned: 0,
                committed: 0,
            });
        }

        let completed = batch.run(&self.decryptor, self.yield_every).await;
        let committed = self.cache.commit(completed)?;
        debug!(planned, committed, conversation = %self.cache.conversation_id(), "Reconciled");
        Ok(ReconcileReport { planned, committed })
    }

    pub fn switch_to(&mut self, conversation_id: ConversationId) {
        self.cache.switch_to(conversation_id);
    }

    /// The message now carries a new envelope; recompute on next pass
    pub fn on_message_edited(&mut self, message_id: &MessageId) {
        self.cache.invalidate(message_id);
    }

    pub fn on_message_deleted(&mut self, message_id: &MessageId) {
        self.cache.invalidate(message_id);
    }

    /// Remember the plaintext of a message this user just sent
    pub fn record_sent(&mut self, message_id: MessageId, plaintext: &str) {
        self.cache.set(message_id, DecryptedContent::Text(plaintext.to_string()));
    }

    /// Text to show for `message`; `None` until a pass has covered it
    pub fn render(&self, message: &ConversationMessage) -> Option<String> {
        self.render_with(message, |user| user.to_string())
    }

    /// Like [`Self::render`], resolving actor ids in activity lines to names
    pub fn render_with<F>(&self, message: &ConversationMessage, display_name: F) -> Option<String>
    where
        F: Fn(&UserId) -> String,
    {
        // deletion wins even over a stale cached plaintext
        if message.is_deleted {
            return Some(self.display.deleted_placeholder.clone());
        }

        let content = self.cache.get(&message.id)?;
        Some(match content {
            DecryptedContent::Text(text) => text.clone(),
            DecryptedContent::Deleted => self.display.deleted_placeholder.clone(),
            DecryptedContent::Undecryptable => self.display.undecryptable_placeholder.clone(),
            DecryptedContent::System(event) => event.describe(&display_name(&event.actor_id)),
        })
    }

    pub fn search<'a>(
        &self,
        messages: &'a [ConversationMessage],
        query: &str,
    ) -> Vec<&'a ConversationMessage> {
        self.cache.search(messages, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_keys::MemoryKeyStore;
    use serde_json::json;

    fn view() -> ConversationView {
        let decryptor = Arc::new(Decryptor::new(
            Arc::new(MemoryKeyStore::new()),
            UserId::from("alice"),
        ));
        ConversationView::new(ConversationId::from("c1"), decryptor, &Config::default())
    }

    #[tokio::test]
    async fn test_render_before_and_after_reconcile() {
        let mut view = view();
        let msg = ConversationMessage::new(
            MessageId::from("m1"),
            UserId::from("bob"),
            json!("hey"),
        );

        assert_eq!(view.render(&msg), None);
        let report = view.reconcile(std::slice::from_ref(&msg)).await.unwrap();
        assert_eq!(report.planned, 1);
        assert_eq!(report.committed, 1);
        assert_eq!(view.render(&msg), Some("hey".to_string()));
    }

    #[tokio::test]
    async fn test_render_system_event_with_names() {
        let mut view = view();
        let msg = ConversationMessage::new(
            MessageId::from("m1"),
            UserId::from("bob"),
            json!({"type": "system", "action": "unpin", "actorId": "bob"}),
        );
        view.reconcile(std::slice::from_ref(&msg)).await.unwrap();

        let line = view.render_with(&msg, |id| format!("@{}", id));
        assert_eq!(line, Some("@bob unpinned a message".to_string()));
    }

    #[tokio::test]
    async fn test_record_sent_skips_decryption() {
        let mut view = view();
        let msg = ConversationMessage::new(
            MessageId::from("m1"),
            UserId::from("alice"),
            json!(r#"{"v":"2","ciphertext":"AA==","iv":"AA==","keys":{}}"#),
        );
        view.record_sent(MessageId::from("m1"), "my own words");

        let report = view.reconcile(std::slice::from_ref(&msg)).await.unwrap();
        assert_eq!(report.planned, 0);
        assert_eq!(view.render(&msg), Some("my own words".to_string()));
        assert_eq!(view.decryptor().attempts(), 0);
    }
}
