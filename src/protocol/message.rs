//! Chat message type and its kind/attachment invariant

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Kind of chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text message
    Text,
    /// Audio clip, carried as an attachment reference
    Audio,
    /// Video clip, carried as an attachment reference
    Video,
    /// Informational message from the hub (never persisted)
    System,
}

impl MessageKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Audio => "audio",
            MessageKind::Video => "video",
            MessageKind::System => "system",
        }
    }

    /// Parse a wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageKind::Text),
            "audio" => Some(MessageKind::Audio),
            "video" => Some(MessageKind::Video),
            "system" => Some(MessageKind::System),
            _ => None,
        }
    }

    /// Whether messages of this kind carry textual content
    pub fn carries_content(&self) -> bool {
        matches!(self, MessageKind::Text | MessageKind::System)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an uploaded file
///
/// The hub never inspects file contents, only this reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// URL produced by the upload collaborator
    #[serde(rename = "fileUrl")]
    pub url: String,

    /// Original file name
    #[serde(rename = "fileName")]
    pub name: String,

    /// File size in bytes
    #[serde(rename = "fileSize")]
    pub size_bytes: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// A chat message, immutable once persisted
///
/// Exactly one of `content` / `attachment` is populated, decided by `kind`:
/// `text` and `system` carry `content`, `audio` and `video` carry an
/// `attachment`. [`Message::validate`] enforces this before a message is
/// accepted for persistence or broadcast.
///
/// `timestamp` is sender-supplied logical time in milliseconds since epoch
/// and is the pagination sort key. `id` is assigned by the store on append;
/// the hub echoes it back in broadcast frames so receivers have a real
/// unique identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned id, absent until the message has been appended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Opaque author id, not validated against any identity system
    #[serde(rename = "userId", default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,

    /// Opaque author display name
    #[serde(rename = "userName", default, skip_serializing_if = "String::is_empty")]
    pub sender_name: String,

    /// Message kind, serialized as the frame `type`
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Textual content, present iff `kind` is `text` or `system`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// File reference, present iff `kind` is `audio` or `video`
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,

    /// Sender-supplied logical time (ms since epoch)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timestamp: i64,
}

impl Message {
    /// Create a text message
    pub fn text(
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: None,
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            kind: MessageKind::Text,
            content: Some(content.into()),
            attachment: None,
            timestamp,
        }
    }

    /// Create an audio or video message carrying an attachment
    pub fn with_attachment(
        kind: MessageKind,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        attachment: Attachment,
        timestamp: i64,
    ) -> Self {
        Self {
            id: None,
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            kind,
            content: None,
            attachment: Some(attachment),
            timestamp,
        }
    }

    /// Create a system message (hub-originated, never persisted)
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: None,
            sender_id: String::new(),
            sender_name: String::new(),
            kind: MessageKind::System,
            content: Some(content.into()),
            attachment: None,
            timestamp: 0,
        }
    }

    /// Check the kind/content/attachment invariant
    ///
    /// Called by the hub before persistence; violating messages are rejected
    /// and never appended or broadcast.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.kind.carries_content() {
            if self.content.is_none() {
                return Err(ProtocolError::InvalidMessage(format!(
                    "{} message without content",
                    self.kind
                )));
            }
            if self.attachment.is_some() {
                return Err(ProtocolError::InvalidMessage(format!(
                    "{} message with attachment",
                    self.kind
                )));
            }
        } else {
            if self.attachment.is_none() {
                return Err(ProtocolError::InvalidMessage(format!(
                    "{} message without attachment",
                    self.kind
                )));
            }
            if self.content.is_some() {
                return Err(ProtocolError::InvalidMessage(format!(
                    "{} message with content",
                    self.kind
                )));
            }
        }
        Ok(())
    }
}
