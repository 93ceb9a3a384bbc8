//! User input for one turn: plain text, or text plus file attachments.

use super::content::FileRef;
use serde::{Deserialize, Serialize};

/// Multimodal input: free text plus ordered file attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultimodalInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

/// The saved input for one turn.
///
/// Serializes untagged (plain text as a JSON string, multimodal as an
/// object), so a saved input round-trips back into the entry box on undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnInput {
    Text(String),
    Multimodal(MultimodalInput),
}

impl TurnInput {
    pub fn text(s: impl Into<String>) -> Self {
        TurnInput::Text(s.into())
    }

    pub fn multimodal(text: Option<String>, files: Vec<FileRef>) -> Self {
        TurnInput::Multimodal(MultimodalInput { text, files })
    }

    /// Whether the input carries non-empty text. Absent and empty text are
    /// equivalent everywhere in the engine.
    pub fn has_text(&self) -> bool {
        self.text_content().is_some()
    }

    /// The text payload, if non-empty.
    pub fn text_content(&self) -> Option<&str> {
        let text = match self {
            TurnInput::Text(t) => Some(t.as_str()),
            TurnInput::Multimodal(m) => m.text.as_deref(),
        };
        text.filter(|t| !t.is_empty())
    }

    pub fn files(&self) -> &[FileRef] {
        match self {
            TurnInput::Text(_) => &[],
            TurnInput::Multimodal(m) => &m.files,
        }
    }

    pub fn file_count(&self) -> usize {
        self.files().len()
    }

    /// Number of transcript entries [`append_input`] creates for this
    /// input: one per file, plus the text entry when text is non-empty.
    ///
    /// [`append_input`]: super::Transcript::append_input
    pub fn entry_count(&self) -> usize {
        self.file_count() + usize::from(self.has_text())
    }

    /// Degenerate input: nothing to submit. Callers reject these before
    /// they reach the transcript ops.
    pub fn is_empty(&self) -> bool {
        !self.has_text() && self.files().is_empty()
    }
}

impl From<&str> for TurnInput {
    fn from(s: &str) -> Self {
        TurnInput::Text(s.to_string())
    }
}

impl From<String> for TurnInput {
    fn from(s: String) -> Self {
        TurnInput::Text(s)
    }
}

impl From<MultimodalInput> for TurnInput {
    fn from(input: MultimodalInput) -> Self {
        TurnInput::Multimodal(input)
    }
}
