//! Headless chat session.
//!
//! Owns the transcript, the saved input, and the per-session single-flight
//! guard, and exposes the five operations a chat UI binds its controls to:
//! submit, retry, undo, clear, stop. The host framework does the actual
//! event wiring; this layer only translates events into transcript state.

use crate::error::{ConfigError, SessionError, TurnError};
use crate::responder::Responder;
use crate::transcript::{self, Transcript, TurnInput, WireFormat};
use crate::turn::{self, TurnContext, TurnEvent, TurnState, TurnStream};
use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Session construction parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Active transcript wire format.
    pub format: WireFormat,
    /// Whether multimodal (text + files) input is accepted.
    pub multimodal: bool,
    /// Permits on the blocking-offload limiter.
    pub concurrency_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            format: WireFormat::Tuples,
            multimodal: false,
            concurrency_limit: 1,
        }
    }
}

struct Shared {
    transcript: Transcript,
    saved_input: Option<TurnInput>,
    state: TurnState,
    cancel: CancellationToken,
    /// Bumped per turn so a stale turn's stream never writes back state.
    generation: u64,
}

/// Builder for [`ChatSession`]. Configuration errors surface here, at
/// construction, not at first use.
pub struct ChatSessionBuilder {
    config: SessionConfig,
    responder: Responder,
    limiter: Option<Arc<Semaphore>>,
}

impl ChatSessionBuilder {
    pub fn format(mut self, format: WireFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn multimodal(mut self, multimodal: bool) -> Self {
        self.config.multimodal = multimodal;
        self
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.config.concurrency_limit = limit;
        self
    }

    /// Share a blocking-offload limiter across sessions. Without one, the
    /// session builds its own with `concurrency_limit` permits.
    pub fn limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn build(self) -> Result<ChatSession, ConfigError> {
        if self.config.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(Semaphore::new(self.config.concurrency_limit)));
        Ok(ChatSession {
            id: Uuid::new_v4(),
            shared: Arc::new(Mutex::new(Shared {
                transcript: Transcript::new(self.config.format),
                saved_input: None,
                state: TurnState::Idle,
                cancel: CancellationToken::new(),
                generation: 0,
            })),
            responder: Arc::new(self.responder),
            limiter,
            config: self.config,
        })
    }
}

/// A headless chat session.
pub struct ChatSession {
    id: Uuid,
    config: SessionConfig,
    responder: Arc<Responder>,
    limiter: Arc<Semaphore>,
    shared: Arc<Mutex<Shared>>,
}

impl ChatSession {
    pub fn builder(responder: Responder) -> ChatSessionBuilder {
        ChatSessionBuilder {
            config: SessionConfig::default(),
            responder,
            limiter: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn format(&self) -> WireFormat {
        self.config.format
    }

    /// Current transcript: the pending input while a turn starts, the last
    /// emitted snapshot while it streams, the settled state afterwards.
    pub fn transcript(&self) -> Transcript {
        self.lock().transcript.clone()
    }

    pub fn state(&self) -> TurnState {
        self.lock().state
    }

    pub fn saved_input(&self) -> Option<TurnInput> {
        self.lock().saved_input.clone()
    }

    /// Submit a user turn. Rejected while another turn is in flight; the
    /// input is saved for undo and retry.
    pub fn submit(&self, input: TurnInput) -> Result<SessionTurn, SessionError> {
        if input.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        if !self.config.multimodal && matches!(input, TurnInput::Multimodal(_)) {
            return Err(SessionError::MultimodalDisabled);
        }
        let mut shared = self.lock();
        if shared.state.in_flight() {
            return Err(SessionError::Busy);
        }
        shared.saved_input = Some(input.clone());
        Ok(self.start_turn(&mut shared, input))
    }

    /// Replay the last turn: remove it, then run the saved input again.
    pub fn retry(&self) -> Result<SessionTurn, SessionError> {
        let mut shared = self.lock();
        if shared.state.in_flight() {
            return Err(SessionError::Busy);
        }
        let Some(input) = shared.saved_input.clone() else {
            return Err(SessionError::NothingToRetry);
        };
        let transcript = std::mem::replace(&mut shared.transcript, Transcript::new(self.config.format));
        let (transcript, input) = transcript::undo_last(transcript, input);
        shared.transcript = transcript;
        Ok(self.start_turn(&mut shared, input))
    }

    /// Remove the last turn; returns the saved input so the caller can
    /// repopulate the entry box. `None` when there is nothing to undo.
    pub fn undo(&self) -> Result<Option<TurnInput>, SessionError> {
        let mut shared = self.lock();
        if shared.state.in_flight() {
            return Err(SessionError::Busy);
        }
        let Some(input) = shared.saved_input.clone() else {
            return Ok(None);
        };
        let transcript = std::mem::replace(&mut shared.transcript, Transcript::new(self.config.format));
        let (transcript, input) = transcript::undo_last(transcript, input);
        shared.transcript = transcript;
        Ok(Some(input))
    }

    /// Drop the transcript and the saved input.
    pub fn clear(&self) -> Result<(), SessionError> {
        let mut shared = self.lock();
        if shared.state.in_flight() {
            return Err(SessionError::Busy);
        }
        shared.transcript = Transcript::new(self.config.format);
        shared.saved_input = None;
        shared.state = TurnState::Idle;
        Ok(())
    }

    /// Stop the in-flight turn, if any. The last emitted snapshot stands;
    /// nothing is rolled back.
    pub fn stop(&self) {
        let mut shared = self.lock();
        if shared.state.in_flight() {
            tracing::debug!(session = %self.id, "turn stopped");
            shared.cancel.cancel();
            shared.state = TurnState::Cancelled;
        }
    }

    fn start_turn(&self, shared: &mut Shared, input: TurnInput) -> SessionTurn {
        let transcript = std::mem::replace(&mut shared.transcript, Transcript::new(self.config.format));
        let transcript = transcript.append_input(&input);
        shared.transcript = transcript.clone();
        shared.state = TurnState::AwaitingResponse;
        shared.cancel = CancellationToken::new();
        shared.generation += 1;

        let ctx = TurnContext {
            responder: Arc::clone(&self.responder),
            limiter: Arc::clone(&self.limiter),
            cancel: shared.cancel.clone(),
            session_id: self.id,
        };
        tracing::debug!(
            session = %self.id,
            kind = self.responder.kind(),
            entries = transcript.len(),
            "turn started"
        );
        SessionTurn {
            inner: turn::run(input, transcript, ctx),
            shared: Arc::clone(&self.shared),
            cancel: shared.cancel.clone(),
            generation: shared.generation,
            done: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }
}

/// Snapshot stream for one in-flight turn.
///
/// Each item mirrors into the session's transcript as it is polled.
/// Dropping the stream before it ends stops the turn, like the UI's stop
/// control.
pub struct SessionTurn {
    inner: TurnStream,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
    generation: u64,
    done: bool,
}

impl SessionTurn {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }

    fn finish(&mut self) {
        self.done = true;
        let cancelled = self.cancel.is_cancelled();
        let mut shared = self.lock();
        if shared.generation == self.generation && shared.state.in_flight() {
            shared.state = if cancelled {
                TurnState::Cancelled
            } else {
                TurnState::Settled
            };
        }
    }
}

impl Stream for SessionTurn {
    type Item = Result<TurnEvent, TurnError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                match &item {
                    Ok(event) => {
                        let mut shared = this.lock();
                        if shared.generation == this.generation {
                            shared.transcript = event.transcript.clone();
                            if shared.state.in_flight() {
                                shared.state = TurnState::Streaming;
                            }
                        }
                    }
                    Err(_) => {
                        // Responder failure ends the turn with nothing
                        // settled; the session is free for the next event.
                        let mut shared = this.lock();
                        if shared.generation == this.generation && shared.state.in_flight() {
                            shared.state = TurnState::Idle;
                        }
                    }
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SessionTurn {
    fn drop(&mut self) {
        if !self.done {
            // Abandoning the stream cancels the turn.
            self.cancel.cancel();
            let mut shared = self.lock();
            if shared.generation == self.generation && shared.state.in_flight() {
                shared.state = TurnState::Cancelled;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
