//! Decrypted-content cache
//!
//! Memoises `MessageId -> DecryptedContent` for the conversation currently
//! open. Entries are never recomputed once set; only an explicit
//! [`DecryptedCache::invalidate`] (edit or delete) or a conversation switch
//! removes them.
//!
//! Population happens in passes:
//!
//! ```text
//! plan(messages)  -> PendingBatch     (uncached ids only)
//! batch.run(dec)  -> CompletedBatch   (async, no access to the cache)
//! commit(batch)                       (one write per pass)
//! ```
//!
//! A batch remembers the conversation and generation it was planned for and
//! is rejected at commit if the view has moved on. Results for messages
//! invalidated after planning are dropped so an edit is never overwritten by
//! the pre-edit plaintext.

use super::message::ConversationMessage;
use crate::core_crypto::decryptor::{DecryptedContent, Decryptor};
use crate::metrics::{
    record_counter, Timer, CACHE_COMMITS, CACHE_PASS_DURATION, CACHE_STALE_BATCHES,
};
use crate::types::{ConversationId, MessageId};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, trace};

/// Cache errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The batch was planned before the view switched conversations
    #[error(
        "Stale batch for conversation {planned} (generation {planned_generation}); \
         view is on {current} (generation {current_generation})"
    )]
    StaleBatch {
        planned: ConversationId,
        planned_generation: u64,
        current: ConversationId,
        current_generation: u64,
    },
}

/// Per-conversation map of decrypted content
#[derive(Debug)]
pub struct DecryptedCache {
    conversation_id: ConversationId,
    generation: u64,
    revision: u64,
    entries: HashMap<MessageId, DecryptedContent>,
    invalidated_at: HashMap<MessageId, u64>,
}

impl DecryptedCache {
    pub fn new(conversation_id: ConversationId) -> Self {
        DecryptedCache {
            conversation_id,
            generation: 0,
            revision: 0,
            entries: HashMap::new(),
            invalidated_at: HashMap::new(),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, message_id: &MessageId) -> Option<&DecryptedContent> {
        self.entries.get(message_id)
    }

    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.entries.contains_key(message_id)
    }

    /// Store content for a message, e.g. a locally sent message whose
    /// plaintext is already known
    pub fn set(&mut self, message_id: MessageId, content: DecryptedContent) {
        self.entries.insert(message_id, content);
    }

    /// Evict an entry after its message was edited or deleted
    pub fn invalidate(&mut self, message_id: &MessageId) -> Option<DecryptedContent> {
        self.revision += 1;
        self.invalidated_at.insert(message_id.clone(), self.revision);
        self.entries.remove(message_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything and start serving `conversation_id`
    pub fn switch_to(&mut self, conversation_id: ConversationId) {
        debug!(from = %self.conversation_id, to = %conversation_id, "Switching conversation cache");
        self.conversation_id = conversation_id;
        self.generation += 1;
        self.entries.clear();
        self.invalidated_at.clear();
    }

    /// Collect the messages that still need a cache entry
    pub fn plan(&self, messages: &[ConversationMessage]) -> PendingBatch {
        let mut seen = HashSet::new();
        let pending: Vec<ConversationMessage> = messages
            .iter()
            .filter(|m| !self.entries.contains_key(&m.id) && seen.insert(m.id.clone()))
            .cloned()
            .collect();

        trace!(total = messages.len(), pending = pending.len(), "Planned reconciliation pass");
        PendingBatch {
            conversation_id: self.conversation_id.clone(),
            generation: self.generation,
            revision: self.revision,
            messages: pending,
        }
    }

    /// Apply a finished pass; returns how many entries were added
    pub fn commit(&mut self, batch: CompletedBatch) -> Result<usize, CacheError> {
        if batch.conversation_id != self.conversation_id || batch.generation != self.generation {
            record_counter(CACHE_STALE_BATCHES, 1);
            return Err(CacheError::StaleBatch {
                planned: batch.conversation_id,
                planned_generation: batch.generation,
                current: self.conversation_id.clone(),
                current_generation: self.generation,
            });
        }

        let mut inserted = 0;
        for (message_id, content) in batch.results {
            let invalidated = self.invalidated_at.get(&message_id).copied();
            match invalidated {
                Some(revision) if revision > batch.revision => continue,
                // planned after the invalidation: the entry below supersedes
                // the marker, and older batches can no longer overwrite it
                Some(_) => {
                    self.invalidated_at.remove(&message_id);
                }
                None => {}
            }
            if let Entry::Vacant(slot) = self.entries.entry(message_id) {
                slot.insert(content);
                inserted += 1;
            }
        }

        record_counter(CACHE_COMMITS, 1);
        Ok(inserted)
    }

    pub(crate) fn entries(&self) -> &HashMap<MessageId, DecryptedContent> {
        &self.entries
    }
}

/// Messages awaiting decryption for one pass
#[derive(Debug)]
pub struct PendingBatch {
    conversation_id: ConversationId,
    generation: u64,
    revision: u64,
    messages: Vec<ConversationMessage>,
}

impl PendingBatch {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Classify and decrypt every pending message, yielding to the runtime
    /// every `yield_every` messages (0 disables yielding)
    pub async fn run(self, decryptor: &Decryptor, yield_every: usize) -> CompletedBatch {
        let timer = Timer::new(CACHE_PASS_DURATION);
        let mut results = Vec::with_capacity(self.messages.len());
        for (index, message) in self.messages.iter().enumerate() {
            results.push((message.id.clone(), decryptor.open(message)));
            if yield_every > 0 && (index + 1) % yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }
        timer.stop();

        CompletedBatch {
            conversation_id: self.conversation_id,
            generation: self.generation,
            revision: self.revision,
            results,
        }
    }
}

/// Results of a pass, not yet visible to readers of the cache
#[derive(Debug)]
pub struct CompletedBatch {
    conversation_id: ConversationId,
    generation: u64,
    revision: u64,
    results: Vec<(MessageId, DecryptedContent)>,
}

impl CompletedBatch {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
