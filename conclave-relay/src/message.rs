//! Relay frames
//!
//! Clients speak two JSON shapes: `{"id": ...}` binds the connection to a
//! peer id, `{"target": ..., "content": ...}` forwards `content` to another
//! peer. A non-empty `id` takes precedence when both are present.

use crate::error::{RelayError, Result};
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Register { id: String },
    /// `content` is the raw JSON text exactly as the sender wrote it
    Forward { target: String, content: String },
}

/// Top-level fields of a frame. Only JSON objects deserialize into a map.
type Frame = HashMap<String, Box<RawValue>>;

fn field<T: DeserializeOwned>(frame: &Frame, name: &str) -> Result<Option<T>> {
    match frame.get(name) {
        Some(raw) => Ok(serde_json::from_str(raw.get())?),
        None => Ok(None),
    }
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self> {
        let mut frame: Frame = serde_json::from_str(text)?;

        if let Some(id) = field::<String>(&frame, "id")?.filter(|id| !id.is_empty()) {
            return Ok(Self::Register { id });
        }

        match field::<String>(&frame, "target")?.filter(|target| !target.is_empty()) {
            Some(target) => Ok(Self::Forward {
                target,
                content: frame
                    .remove("content")
                    .map_or_else(|| "null".to_string(), |raw| raw.get().to_string()),
            }),
            None => Err(RelayError::UnrecognizedFrame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register() {
        assert_eq!(
            InboundMessage::parse(r#"{"id":"p1"}"#).unwrap(),
            InboundMessage::Register { id: "p1".to_string() }
        );
    }

    #[test]
    fn test_forward_content_is_kept_verbatim() {
        let parsed =
            InboundMessage::parse(r#"{"target":"p2","content":{"z":1, "a":[true,null]}}"#).unwrap();

        assert_eq!(
            parsed,
            InboundMessage::Forward {
                target: "p2".to_string(),
                content: r#"{"z":1, "a":[true,null]}"#.to_string(),
            }
        );
    }

    #[test]
    fn test_register_wins_over_forward() {
        let parsed = InboundMessage::parse(r#"{"id":"p1","target":"p2","content":1}"#).unwrap();
        assert!(matches!(parsed, InboundMessage::Register { .. }));
    }

    #[test]
    fn test_forward_without_content_sends_null() {
        let parsed = InboundMessage::parse(r#"{"target":"p2"}"#).unwrap();
        assert!(matches!(parsed, InboundMessage::Forward { content, .. } if content == "null"));
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(RelayError::Malformed(_))
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"id":""}"#),
            Err(RelayError::UnrecognizedFrame)
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"hello":"world"}"#),
            Err(RelayError::UnrecognizedFrame)
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"id":42}"#),
            Err(RelayError::Malformed(_))
        ));
        // Positional arrays are not frames
        assert!(matches!(
            InboundMessage::parse(r#"["alice"]"#),
            Err(RelayError::Malformed(_))
        ));
        assert!(matches!(
            InboundMessage::parse(r#"["", "p2", {"a":1}]"#),
            Err(RelayError::Malformed(_))
        ));
    }
}
