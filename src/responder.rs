//! Responder variants and the uniform reply-stream adapter.
//!
//! A responder is the user-supplied function that turns (message, history)
//! into a reply, or into a stream of incremental replies. The shape of the
//! function is classified exactly once, at construction, into one of four
//! variants; every variant is adapted into the same lazy async reply
//! sequence by [`Responder::replies`], so no call site ever inspects the
//! function again.

use crate::error::ResponderError;
use crate::transcript::{Content, Record, Transcript, TurnInput};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

/// One response value: plain text, or a structured assistant record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Message(Record),
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }

    pub fn message(record: Record) -> Self {
        Reply::Message(record)
    }

    /// Normalize into a record-form assistant entry. Plain strings are
    /// wrapped; structured records pass through unchanged.
    pub fn into_record(self) -> Record {
        match self {
            Reply::Text(s) => Record::assistant(Content::Text(s)),
            Reply::Message(record) => record,
        }
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::Text(s)
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

/// Everything a responder call receives.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// The submitted input for this turn.
    pub message: TurnInput,
    /// Prior transcript, with the pending input entries already trimmed.
    pub history: Transcript,
    /// Session the turn belongs to.
    pub session_id: Uuid,
}

/// Result of a single responder call or stream step.
pub type ReplyResult = Result<Reply, ResponderError>;

type SyncFn = dyn Fn(TurnRequest) -> ReplyResult + Send + Sync;
type AsyncFn = dyn Fn(TurnRequest) -> BoxFuture<'static, ReplyResult> + Send + Sync;
type SyncStreamFn =
    dyn Fn(TurnRequest) -> Box<dyn Iterator<Item = ReplyResult> + Send> + Send + Sync;
type AsyncStreamFn = dyn Fn(TurnRequest) -> BoxStream<'static, ReplyResult> + Send + Sync;

/// Interface for struct-based chat backends.
///
/// Adapted into the async variant via [`Responder::from_service`]; closures
/// use the [`Responder`] constructors directly.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Produce one reply for the request.
    async fn respond(&self, request: TurnRequest) -> ReplyResult;
}

/// A user-supplied response function, classified once at construction.
///
/// Extra user-defined arguments are captured by the closure; the per-call
/// context travels in [`TurnRequest`].
pub enum Responder {
    /// Plain function. Offloaded to the blocking pool under the limiter so
    /// the event loop is never blocked.
    Sync(Arc<SyncFn>),
    /// Async function, run directly on the event loop.
    Async(Arc<AsyncFn>),
    /// Blocking iterator, drained on the blocking pool under the limiter.
    SyncStream(Arc<SyncStreamFn>),
    /// Async stream, consumed directly.
    AsyncStream(Arc<AsyncStreamFn>),
}

impl Responder {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(TurnRequest) -> ReplyResult + Send + Sync + 'static,
    {
        Responder::Sync(Arc::new(f))
    }

    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(TurnRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ReplyResult> + Send + 'static,
    {
        Responder::Async(Arc::new(move |request| f(request).boxed()))
    }

    pub fn sync_stream<F, I>(f: F) -> Self
    where
        F: Fn(TurnRequest) -> I + Send + Sync + 'static,
        I: Iterator<Item = ReplyResult> + Send + 'static,
    {
        Responder::SyncStream(Arc::new(move |request| {
            Box::new(f(request)) as Box<dyn Iterator<Item = ReplyResult> + Send>
        }))
    }

    pub fn async_stream<F, S>(f: F) -> Self
    where
        F: Fn(TurnRequest) -> S + Send + Sync + 'static,
        S: futures::Stream<Item = ReplyResult> + Send + 'static,
    {
        Responder::AsyncStream(Arc::new(move |request| f(request).boxed()))
    }

    /// Adapt a struct-based [`ChatService`] into the async variant.
    pub fn from_service(service: Arc<dyn ChatService>) -> Self {
        Responder::Async(Arc::new(move |request| {
            let service = Arc::clone(&service);
            async move { service.respond(request).await }.boxed()
        }))
    }

    /// Whether this responder produces incremental replies.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Responder::SyncStream(_) | Responder::AsyncStream(_))
    }

    /// Variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Responder::Sync(_) => "sync",
            Responder::Async(_) => "async",
            Responder::SyncStream(_) => "sync_stream",
            Responder::AsyncStream(_) => "async_stream",
        }
    }

    /// Invoke the responder and adapt the result into one lazy reply
    /// stream, regardless of variant.
    ///
    /// Sync variants run on the blocking pool, gated by `limiter` so
    /// concurrent blocking calls stay bounded. Blocking-iterator replies
    /// are forwarded through a bounded channel: strictly ordered, at most
    /// one reply buffered ahead of the consumer. Must be called from
    /// within a tokio runtime.
    pub(crate) fn replies(
        &self,
        request: TurnRequest,
        limiter: Arc<Semaphore>,
    ) -> BoxStream<'static, ReplyResult> {
        match self {
            Responder::Async(f) => futures::stream::once(f(request)).boxed(),
            Responder::AsyncStream(f) => f(request),
            Responder::Sync(f) => {
                let f = Arc::clone(f);
                futures::stream::once(async move {
                    let _permit = match limiter.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(closed) => return Err(Box::new(closed) as ResponderError),
                    };
                    match tokio::task::spawn_blocking(move || f(request)).await {
                        Ok(result) => result,
                        Err(join) => Err(Box::new(join) as ResponderError),
                    }
                })
                .boxed()
            }
            Responder::SyncStream(f) => {
                let f = Arc::clone(f);
                let (tx, rx) = mpsc::channel(1);
                tokio::spawn(async move {
                    let _permit = match limiter.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(closed) => {
                            let _ = tx.send(Err(Box::new(closed) as ResponderError)).await;
                            return;
                        }
                    };
                    let drained = tokio::task::spawn_blocking(move || {
                        for item in f(request) {
                            // A failed send means the consumer is gone: the
                            // turn was cancelled or dropped.
                            if tx.blocking_send(item).is_err() {
                                return;
                            }
                        }
                    })
                    .await;
                    if let Err(join) = drained {
                        tracing::error!(error = %join, "streaming responder panicked");
                    }
                });
                ReceiverStream::new(rx).boxed()
            }
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Responder::Sync(_) => "Responder::Sync",
            Responder::Async(_) => "Responder::Async",
            Responder::SyncStream(_) => "Responder::SyncStream",
            Responder::AsyncStream(_) => "Responder::AsyncStream",
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
