//! Chat transcript model and the pure operations over it.
//!
//! A transcript is an ordered sequence of entries in one of two wire
//! formats: tuple pairs (`[[user, assistant], ...]`) or flat role-tagged
//! records (`[{role, content}, ...]`). Entries are appended during a turn
//! and truncated from the tail on undo and retry; nothing is ever
//! reordered. All operations take the transcript by value and return the
//! new value, so the caller always holds the single current reference.

mod content;
mod input;

#[cfg(test)]
mod proptests;

pub use content::{Content, FileRef};
pub use input::{MultimodalInput, TurnInput};

use serde::{Deserialize, Serialize};

/// Message role in record form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Record-form entry: a flat role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub role: Role,
    pub content: Content,
}

impl Record {
    pub fn user(content: impl Into<Content>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Tuple-form entry: an ordered (user, assistant) pair. Either side may be
/// null for a pending or absent half-turn.
///
/// Serializes as a 2-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "(Option<Content>, Option<Content>)",
    into = "(Option<Content>, Option<Content>)"
)]
pub struct Pair {
    pub user: Option<Content>,
    pub assistant: Option<Content>,
}

impl From<(Option<Content>, Option<Content>)> for Pair {
    fn from((user, assistant): (Option<Content>, Option<Content>)) -> Self {
        Self { user, assistant }
    }
}

impl From<Pair> for (Option<Content>, Option<Content>) {
    fn from(pair: Pair) -> Self {
        (pair.user, pair.assistant)
    }
}

/// Active transcript wire format, chosen once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Ordered `[user, assistant]` pairs.
    #[default]
    Tuples,
    /// Flat `{role, content}` records.
    Messages,
}

/// Ordered transcript in one of the two wire formats.
///
/// Serializes untagged; an empty transcript deserializes as tuples, every
/// non-empty one round-trips into its own format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transcript {
    Tuples(Vec<Pair>),
    Messages(Vec<Record>),
}

impl Transcript {
    pub fn new(format: WireFormat) -> Self {
        match format {
            WireFormat::Tuples => Transcript::Tuples(Vec::new()),
            WireFormat::Messages => Transcript::Messages(Vec::new()),
        }
    }

    pub fn format(&self) -> WireFormat {
        match self {
            Transcript::Tuples(_) => WireFormat::Tuples,
            Transcript::Messages(_) => WireFormat::Messages,
        }
    }

    /// Number of entries: pairs in tuples format, records in messages
    /// format.
    pub fn len(&self) -> usize {
        match self {
            Transcript::Tuples(pairs) => pairs.len(),
            Transcript::Messages(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the pending user turn: one entry per file, then the text
    /// entry when the text is non-empty. Assistant slots stay null until
    /// the turn settles.
    #[must_use]
    pub fn append_input(mut self, input: &TurnInput) -> Self {
        match &mut self {
            Transcript::Tuples(pairs) => {
                for file in input.files() {
                    pairs.push(Pair {
                        user: Some(Content::File(file.clone())),
                        assistant: None,
                    });
                }
                if let Some(text) = input.text_content() {
                    pairs.push(Pair {
                        user: Some(Content::text(text)),
                        assistant: None,
                    });
                }
            }
            Transcript::Messages(records) => {
                for file in input.files() {
                    records.push(Record::user(Content::File(file.clone())));
                }
                if let Some(text) = input.text_content() {
                    records.push(Record::user(Content::text(text)));
                }
            }
        }
        self
    }

    /// Append one settled turn: the input entries plus the assistant entry.
    /// `assistant` is `None` when the responder finished without producing
    /// output; the turn then ends with a null assistant slot.
    #[must_use]
    pub fn append_turn(mut self, input: &TurnInput, assistant: Option<Record>) -> Self {
        match &mut self {
            Transcript::Tuples(pairs) => {
                for file in input.files() {
                    pairs.push(Pair {
                        user: Some(Content::File(file.clone())),
                        assistant: None,
                    });
                }
                // Text and assistant share the final pair; it is present
                // even when the text side is empty so the assistant slot is
                // never dropped.
                pairs.push(Pair {
                    user: input.text_content().map(Content::text),
                    assistant: assistant.map(|record| record.content),
                });
            }
            Transcript::Messages(records) => {
                for file in input.files() {
                    records.push(Record::user(Content::File(file.clone())));
                }
                if let Some(text) = input.text_content() {
                    records.push(Record::user(Content::text(text)));
                }
                if let Some(record) = assistant {
                    records.push(record);
                }
            }
        }
        self
    }

    /// Drop the pending entries appended by [`Transcript::append_input`].
    #[must_use]
    pub(crate) fn trim_pending_input(mut self, input: &TurnInput) -> Self {
        self.truncate_tail(input.entry_count());
        self
    }

    /// Remove up to `count` entries from the tail. Shorter transcripts
    /// truncate to empty; never an error.
    fn truncate_tail(&mut self, count: usize) {
        match self {
            Transcript::Tuples(pairs) => {
                let keep = pairs.len().saturating_sub(count);
                pairs.truncate(keep);
            }
            Transcript::Messages(records) => {
                let keep = records.len().saturating_sub(count);
                records.truncate(keep);
            }
        }
    }
}

/// Number of trailing entries one settled turn occupies.
///
/// Every code path that trims a turn off the tail (submit, retry, undo)
/// goes through this function.
pub fn turn_span(format: WireFormat, input: &TurnInput) -> usize {
    match format {
        // Files take one pair each; text and assistant share the final
        // pair, which exists even when the text side is empty.
        WireFormat::Tuples => input.file_count() + 1,
        // The assistant reply is a separate trailing record.
        WireFormat::Messages => input.entry_count() + 1,
    }
}

/// Remove the most recent turn and hand back the saved input so the caller
/// can repopulate the entry box.
///
/// In record form the trailing assistant record is removed only when
/// present, so undo stays exact after a turn that produced no output.
/// Transcripts shorter than one turn truncate to empty silently.
#[must_use]
pub fn undo_last(mut transcript: Transcript, saved_input: TurnInput) -> (Transcript, TurnInput) {
    let mut span = turn_span(transcript.format(), &saved_input);
    if let Transcript::Messages(records) = &transcript {
        let has_reply = matches!(
            records.last(),
            Some(Record {
                role: Role::Assistant,
                ..
            })
        );
        if !has_reply {
            span -= 1;
        }
    }
    transcript.truncate_tail(span);
    (transcript, saved_input)
}

// ============================================================================
// Tests
// ============================================================================
