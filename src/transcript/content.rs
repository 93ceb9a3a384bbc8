//! Message content: plain text or a file reference.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reference to a file attached to a message.
///
/// The engine never reads the file; it only carries the reference through
/// the transcript so the host can resolve and render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// One unit of message content.
///
/// Serializes untagged: text as a JSON string, files as an object with a
/// `path` key, so the two deserialize unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    File(FileRef),
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Content::File(FileRef::new(path))
    }

    /// Text payload, if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s.as_str()),
            Content::File(_) => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Content::File(_))
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}
