//! Conversation-scoped state: messages, the decrypted-content cache and search

pub mod cache;
pub mod message;
pub mod search;
pub mod view;

pub use cache::{CacheError, CompletedBatch, DecryptedCache, PendingBatch};
pub use message::{ConversationMessage, Reaction};
pub use view::{ConversationView, ReconcileReport};
