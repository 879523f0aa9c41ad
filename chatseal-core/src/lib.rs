//! chatseal core
//!
//! End-to-end encryption pipeline for conversation messages: local key
//! management, the wire envelope codec, encryption for a participant set,
//! decryption with legacy fallback, and the per-conversation cache of
//! decrypted content that rendering and search read from.

pub mod config;
pub mod core_conversation;
pub mod core_crypto;
pub mod core_envelope;
pub mod core_keys;
pub mod logging;
pub mod metrics;
pub mod types;

#[doc(hidden)]
pub mod test_utils;

pub use config::{Config, MissingKeyPolicy};
pub use core_conversation::{ConversationMessage, ConversationView, DecryptedCache};
pub use core_crypto::{
    decrypt, decrypt_with_fallback, encrypt, CryptoError, CryptoResult, DecryptedContent,
    Decryptor, Encryptor, OutgoingContent,
};
pub use core_envelope::{LegacyPacket, MessageEnvelope, ParsedContent, SystemEvent};
pub use core_keys::{FileKeyStore, KeyPair, KeyResolver, KeyStore, MemoryKeyStore, PublicKey};
pub use logging::{init_logging, LogLevel};
pub use types::{ConversationId, MessageId, UserId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        let _ = MissingKeyPolicy::default();
        let _ = UserId::from("alice");
    }
}
