//! Envelope codec
//!
//! Classifies a message's `content` field exactly once, by shape:
//!
//! ```text
//! {"type":"system", ...}                    -> System
//! {"v":"1","data","key","iv"}               -> LegacyV1
//! {"v":"2","ciphertext","iv","keys":{...}}  -> V2
//! anything else (incl. non-JSON)            -> Plaintext
//! ```
//!
//! `content` may arrive either as a JSON-encoded string or as an inline
//! object. Parsing never fails; shapes that claim a version but are missing
//! fields are logged as malformed and shown as plaintext.

use super::types::{
    LegacyPacket, MessageEnvelope, ParsedContent, SystemEvent, ENVELOPE_VERSION, LEGACY_VERSION,
};
use crate::core_crypto::errors::{CryptoError, CryptoResult};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireVersion {
    Legacy,
    Envelope,
}

/// Classify a raw `content` value
pub fn parse(raw: &Value) -> ParsedContent {
    match raw {
        Value::String(text) => parse_str(text),
        Value::Object(object) => classify_object(object)
            .unwrap_or_else(|| ParsedContent::Plaintext(raw.to_string())),
        Value::Null => ParsedContent::Plaintext(String::new()),
        other => ParsedContent::Plaintext(other.to_string()),
    }
}

/// Classify a content string that may hold JSON
pub fn parse_str(text: &str) -> ParsedContent {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => {
            classify_object(&object).unwrap_or_else(|| ParsedContent::Plaintext(text.to_string()))
        }
        _ => ParsedContent::Plaintext(text.to_string()),
    }
}

fn classify_object(object: &Map<String, Value>) -> Option<ParsedContent> {
    if object.get("type").and_then(Value::as_str) == Some("system") {
        return match SystemEvent::deserialize_from(object) {
            Ok(event) => Some(ParsedContent::System(event)),
            Err(e) => {
                debug!(error = %e, "System event missing fields, showing as plaintext");
                None
            }
        };
    }

    let parsed = match wire_version(object.get("v"))? {
        WireVersion::Legacy => {
            serde_json::from_value::<LegacyPacket>(Value::Object(object.clone()))
                .map(ParsedContent::LegacyV1)
        }
        WireVersion::Envelope => {
            serde_json::from_value::<MessageEnvelope>(Value::Object(object.clone()))
                .map(ParsedContent::V2)
        }
    };

    match parsed {
        Ok(content) => Some(content),
        Err(e) => {
            let err = CryptoError::MalformedEnvelope(e.to_string());
            debug!(error = %err, "Treating malformed envelope as plaintext");
            None
        }
    }
}

/// Accept both `"2"` and `2` for the version tag
fn wire_version(tag: Option<&Value>) -> Option<WireVersion> {
    let tag = match tag? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match tag.as_str() {
        LEGACY_VERSION => Some(WireVersion::Legacy),
        ENVELOPE_VERSION => Some(WireVersion::Envelope),
        _ => None,
    }
}

impl SystemEvent {
    fn deserialize_from(object: &Map<String, Value>) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(object.clone()))
    }
}

#[derive(Serialize)]
struct VersionedWire<'a, T: Serialize> {
    v: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

#[derive(Serialize)]
struct SystemWire<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    event: &'a SystemEvent,
}

/// Serialize a V2 envelope to its wire string
pub fn serialize(envelope: &MessageEnvelope) -> CryptoResult<String> {
    Ok(serde_json::to_string(&VersionedWire {
        v: ENVELOPE_VERSION,
        body: envelope,
    })?)
}

/// V2 envelope as an inline JSON object
pub fn to_value(envelope: &MessageEnvelope) -> CryptoResult<Value> {
    Ok(serde_json::to_value(VersionedWire {
        v: ENVELOPE_VERSION,
        body: envelope,
    })?)
}

/// Wire form of a system event, as the backend writes it
pub fn system_event_to_value(event: &SystemEvent) -> CryptoResult<Value> {
    Ok(serde_json::to_value(SystemWire {
        kind: "system",
        event,
    })?)
}

/// Wire form of a legacy packet; only fixtures and migration tooling write these
pub fn legacy_to_value(packet: &LegacyPacket) -> CryptoResult<Value> {
    Ok(serde_json::to_value(VersionedWire {
        v: LEGACY_VERSION,
        body: packet,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_envelope::types::{ContentKind, SystemAction};
    use crate::types::UserId;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn sample_envelope() -> MessageEnvelope {
        let mut wrapped_keys = BTreeMap::new();
        wrapped_keys.insert(UserId::from("alice"), vec![1; 76]);
        wrapped_keys.insert(UserId::from("bob"), vec![2; 76]);
        MessageEnvelope {
            ciphertext: vec![7; 21],
            iv: vec![3; 12],
            wrapped_keys,
        }
    }

    #[test]
    fn test_non_json_is_plaintext() {
        let parsed = parse_str("not json {{");
        assert_eq!(parsed, ParsedContent::Plaintext("not json {{".to_string()));

        let parsed = parse(&json!("not json {{"));
        assert_eq!(parsed, ParsedContent::Plaintext("not json {{".to_string()));
    }

    #[test]
    fn test_json_scalars_and_arrays_are_plaintext() {
        assert_eq!(parse_str("42"), ParsedContent::Plaintext("42".to_string()));
        assert_eq!(parse_str("[1,2]"), ParsedContent::Plaintext("[1,2]".to_string()));
        assert_eq!(parse(&Value::Null), ParsedContent::Plaintext(String::new()));
    }

    #[test]
    fn test_object_without_version_is_plaintext() {
        let text = r#"{"hello":"world"}"#;
        assert_eq!(parse_str(text).kind(), ContentKind::Plaintext);
    }

    #[test]
    fn test_v2_roundtrip_through_string_and_object() {
        let envelope = sample_envelope();

        let wire = serialize(&envelope).unwrap();
        assert!(wire.contains(r#""v":"2""#));
        assert_eq!(parse_str(&wire), ParsedContent::V2(envelope.clone()));

        let value = to_value(&envelope).unwrap();
        assert_eq!(parse(&value), ParsedContent::V2(envelope));
    }

    #[test]
    fn test_numeric_version_tag_accepted() {
        let mut value = to_value(&sample_envelope()).unwrap();
        value["v"] = json!(2);
        assert_eq!(parse(&value).kind(), ContentKind::V2);
    }

    #[test]
    fn test_legacy_packet_detected() {
        let raw = json!({"v": "1", "data": "AAEC", "key": "AwQF", "iv": "BgcI"});
        match parse(&raw) {
            ParsedContent::LegacyV1(packet) => {
                assert_eq!(packet.data, vec![0, 1, 2]);
                assert_eq!(packet.key, vec![3, 4, 5]);
                assert_eq!(packet.iv, vec![6, 7, 8]);
            }
            other => panic!("expected legacy packet, got {:?}", other),
        }
    }

    #[test]
    fn test_versioned_packet_missing_fields_is_plaintext() {
        let text = r#"{"v":"2","ciphertext":"AAAA"}"#;
        assert_eq!(parse_str(text), ParsedContent::Plaintext(text.to_string()));

        let text = r#"{"v":"1","data":"not base64!","key":"AA==","iv":"AA=="}"#;
        assert_eq!(parse_str(text).kind(), ContentKind::Plaintext);
    }

    #[test]
    fn test_unknown_version_is_plaintext() {
        let text = r#"{"v":"3","ciphertext":"AA==","iv":"AA==","keys":{}}"#;
        assert_eq!(parse_str(text).kind(), ContentKind::Plaintext);
    }

    #[test]
    fn test_system_event_detected() {
        let text = r#"{"type":"system","action":"pin","actorId":"alice"}"#;
        match parse_str(text) {
            ParsedContent::System(event) => {
                assert_eq!(event.action, SystemAction::Pin);
                assert_eq!(event.actor_id, UserId::from("alice"));
            }
            other => panic!("expected system event, got {:?}", other),
        }
    }

    #[test]
    fn test_system_event_wire_form() {
        let event = SystemEvent::new(SystemAction::Unpin, UserId::from("bob"));
        let value = system_event_to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "system", "action": "unpin", "actorId": "bob"}));
        assert_eq!(parse(&value), ParsedContent::System(event));
    }
}
