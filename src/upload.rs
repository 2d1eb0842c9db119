//! Upload collaborator contract
//!
//! File uploads are an external service that turns a binary payload into a
//! URL; neither the hub nor the session ever inspects file contents. The
//! returned reference becomes the attachment of an `audio` or `video`
//! message (see [`crate::client::ClientSession::send_file`]).

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::Attachment;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Whether the service accepted the payload
    pub success: bool,

    /// URL where the file is now reachable
    #[serde(rename = "fileUrl")]
    pub file_url: String,

    /// Original file name
    #[serde(rename = "fileName")]
    pub file_name: String,

    /// Size in bytes
    #[serde(rename = "fileSize")]
    pub file_size: i64,

    /// Detected MIME type
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl UploadedFile {
    /// Convert into the attachment reference carried by a message
    pub fn into_attachment(self) -> Attachment {
        Attachment {
            url: self.file_url,
            name: self.file_name,
            size_bytes: self.file_size,
        }
    }
}

/// External upload service
///
/// Implementations typically POST the payload to an HTTP endpoint. The
/// call is awaited in the sender's own task, so a slow upload never stalls
/// the hub's broadcast loop or the session's read loop.
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Upload a binary payload, producing a file reference
    async fn upload(&self, file_name: &str, content_type: &str, data: Bytes)
        -> Result<UploadedFile>;
}
