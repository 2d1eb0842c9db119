//! Frame encoding and decoding
//!
//! A frame is one JSON object per line. The `type` field discriminates:
//! chat message kinds map to [`Frame::Message`], `history` maps to a request
//! or response depending on direction, `error` to an error indication.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

use super::message::{Message, MessageKind};

/// History query, client to hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Maximum number of messages to return; clamped server-side
    pub limit: usize,

    /// Exclusive upper bound on `timestamp`; absent for the initial page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<i64>,
}

/// History query result, hub to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Messages in the window, oldest to newest
    pub messages: Vec<Message>,

    /// Total number of persisted messages
    pub total: u64,

    /// Whether older messages remain beyond this page
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// Error indication sent to the originating connection only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Human-readable description
    pub content: String,
}

/// A decoded wire frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Chat message (including the hub's system welcome)
    Message(Message),
    /// History request
    HistoryRequest(HistoryRequest),
    /// History response
    HistoryResponse(HistoryPage),
    /// Error indication
    Error(ErrorFrame),
}

impl Frame {
    /// Decode a single line
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line)?;
        let ty = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingFrameType)?;

        match ty {
            // Requests carry `limit`, responses carry `messages`.
            "history" => {
                if value.get("messages").is_some() {
                    Ok(Frame::HistoryResponse(serde_json::from_value(value)?))
                } else {
                    Ok(Frame::HistoryRequest(serde_json::from_value(value)?))
                }
            }
            "error" => Ok(Frame::Error(serde_json::from_value(value)?)),
            kind if MessageKind::parse(kind).is_some() => {
                Ok(Frame::Message(serde_json::from_value(value)?))
            }
            other => Err(ProtocolError::UnknownFrameType(other.to_string())),
        }
    }

    /// Encode to a single line (without the trailing newline)
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let value = match self {
            // Message carries its own `type` via the kind field.
            Frame::Message(msg) => serde_json::to_value(msg)?,
            Frame::HistoryRequest(req) => tagged(serde_json::to_value(req)?, "history"),
            Frame::HistoryResponse(page) => tagged(serde_json::to_value(page)?, "history"),
            Frame::Error(err) => tagged(serde_json::to_value(err)?, "error"),
        };
        Ok(serde_json::to_string(&value)?)
    }
}

fn tagged(mut value: Value, ty: &str) -> Value {
    if let Value::Object(ref mut map) = value {
        map.insert("type".to_string(), Value::String(ty.to_string()));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_message() {
        let line = r#"{"userId":"u1","userName":"alice","content":"hi","type":"text","timestamp":42}"#;
        match Frame::decode(line).unwrap() {
            Frame::Message(msg) => {
                assert_eq!(msg.kind, MessageKind::Text);
                assert_eq!(msg.content.as_deref(), Some("hi"));
                assert_eq!(msg.timestamp, 42);
            }
            other => panic!("expected message frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = Frame::decode("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_missing_type() {
        let err = Frame::decode(r#"{"content":"hi"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingFrameType));
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = Frame::decode(r#"{"type":"sticker"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownFrameType(_)));
    }

    #[test]
    fn test_history_request_roundtrip() {
        let frame = Frame::HistoryRequest(HistoryRequest {
            limit: 50,
            before: Some(1700000000000),
        });
        let line = frame.encode().unwrap();
        assert!(line.contains(r#""type":"history""#));
        assert_eq!(Frame::decode(&line).unwrap(), frame);
    }

    #[test]
    fn test_history_response_has_more_field_name() {
        let frame = Frame::HistoryResponse(HistoryPage {
            messages: vec![],
            total: 7,
            has_more: true,
        });
        let line = frame.encode().unwrap();
        assert!(line.contains(r#""hasMore":true"#));

        match Frame::decode(&line).unwrap() {
            Frame::HistoryResponse(page) => {
                assert_eq!(page.total, 7);
                assert!(page.has_more);
            }
            other => panic!("expected history response, got {other:?}"),
        }
    }

    #[test]
    fn test_error_frame_roundtrip() {
        let frame = Frame::Error(ErrorFrame {
            content: "failed to save message".into(),
        });
        let line = frame.encode().unwrap();
        assert_eq!(Frame::decode(&line).unwrap(), frame);
    }
}
