//! Wire formats of the `content` field and their classification

mod b64;
pub mod codec;
pub mod types;

pub use codec::{parse, parse_str, serialize, system_event_to_value, to_value};
pub use types::{
    ContentKind, LegacyPacket, MessageEnvelope, ParsedContent, SystemAction, SystemEvent,
};
