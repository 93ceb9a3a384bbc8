//! Crate error types

use thiserror::Error;

/// Boxed error returned by a user-supplied responder.
pub type ResponderError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Invalid construction arguments. Surfaced eagerly, never recoverable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,
    #[error("example {index} is multimodal but the session accepts text-only input")]
    MultimodalExample { index: usize },
    #[error("example {index} has no text and no files")]
    EmptyExample { index: usize },
}

/// Errors surfaced by session event handlers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A turn is already in flight. Stop it or drain it first.
    #[error("session is busy, a turn is already in flight")]
    Busy,
    /// Degenerate input: no text and no files.
    #[error("input has no text and no files")]
    EmptyInput,
    /// Multimodal input submitted to a text-only session.
    #[error("multimodal input on a text-only session")]
    MultimodalDisabled,
    /// Retry requested before any turn was submitted.
    #[error("no saved input to retry")]
    NothingToRetry,
}

/// Errors emitted on a turn's snapshot stream.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The responder failed. Forwarded to the caller as-is, never retried
    /// here.
    #[error("responder failed")]
    Responder(#[source] ResponderError),
}
