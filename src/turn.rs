//! Per-turn driver.
//!
//! Runs a responder against a transcript and emits one full-transcript
//! snapshot per reply. The snapshot sequence is lazy, non-restartable and
//! finite; its last element is the authoritative transcript state.

use crate::error::TurnError;
use crate::responder::{Reply, Responder, TurnRequest};
use crate::transcript::{Transcript, TurnInput};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Observable lifecycle of a single turn.
///
/// `Idle -> AwaitingResponse -> Streaming* -> Settled`, with `Cancelled`
/// terminal when the stop signal fires first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    /// Responder invoked, nothing emitted yet.
    AwaitingResponse,
    /// At least one snapshot emitted; more may follow.
    Streaming,
    /// Final snapshot emitted.
    Settled,
    /// Stopped by the cancellation signal. The last emitted snapshot
    /// stands; nothing is rolled back.
    Cancelled,
}

impl TurnState {
    /// Terminal states accept no further snapshots.
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Settled | TurnState::Cancelled)
    }

    pub fn in_flight(self) -> bool {
        matches!(self, TurnState::AwaitingResponse | TurnState::Streaming)
    }
}

/// One emission from a running turn.
#[derive(Debug, Clone)]
pub struct TurnEvent {
    /// The reply behind this snapshot; `None` when the responder finished
    /// without producing output.
    pub reply: Option<Reply>,
    /// Full transcript state after applying the reply.
    pub transcript: Transcript,
}

/// Everything a turn needs besides the input: the responder, the blocking
/// limiter, and the cancellation signal.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub responder: Arc<Responder>,
    pub limiter: Arc<Semaphore>,
    pub cancel: CancellationToken,
    pub session_id: Uuid,
}

/// Snapshot stream for one turn. Strictly ordered, at most one snapshot
/// buffered ahead of the consumer.
pub type TurnStream = ReceiverStream<Result<TurnEvent, TurnError>>;

/// Run one turn.
///
/// `transcript` must already contain the pending input entries (see
/// [`Transcript::append_input`]); they are trimmed and rebuilt per snapshot
/// so every emission is a complete transcript. Responder errors are
/// forwarded on the stream and end it; the stop signal ends the stream
/// without a further snapshot.
pub fn run(input: TurnInput, transcript: Transcript, ctx: TurnContext) -> TurnStream {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(drive(input, transcript, ctx, tx));
    ReceiverStream::new(rx)
}

async fn drive(
    input: TurnInput,
    transcript: Transcript,
    ctx: TurnContext,
    tx: mpsc::Sender<Result<TurnEvent, TurnError>>,
) {
    let base = transcript.trim_pending_input(&input);
    let request = TurnRequest {
        message: input.clone(),
        history: base.clone(),
        session_id: ctx.session_id,
    };
    let mut replies = ctx.responder.replies(request, Arc::clone(&ctx.limiter));

    let mut emitted = 0usize;
    loop {
        let item = tokio::select! {
            () = ctx.cancel.cancelled() => {
                tracing::debug!(session = %ctx.session_id, emitted, "turn cancelled");
                return;
            }
            item = replies.next() => item,
        };
        let Some(result) = item else { break };
        match result {
            Ok(reply) => {
                let snapshot = base
                    .clone()
                    .append_turn(&input, Some(reply.clone().into_record()));
                emitted += 1;
                let event = TurnEvent {
                    reply: Some(reply),
                    transcript: snapshot,
                };
                if tx.send(Ok(event)).await.is_err() {
                    // Consumer dropped the stream; nothing left to do.
                    return;
                }
            }
            Err(error) => {
                tracing::debug!(session = %ctx.session_id, emitted, "responder failed");
                let _ = tx.send(Err(TurnError::Responder(error))).await;
                return;
            }
        }
    }

    if emitted == 0 {
        // The responder finished without producing anything. Emit one
        // snapshot with a null assistant slot so the consumer never stalls
        // without a final state.
        let snapshot = base.append_turn(&input, None);
        let event = TurnEvent {
            reply: None,
            transcript: snapshot,
        };
        if tx.send(Ok(event)).await.is_err() {
            return;
        }
        emitted = 1;
    }
    tracing::debug!(session = %ctx.session_id, emitted, "turn settled");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{Content, Pair, Record, WireFormat};
    use futures::stream;
    use std::time::Duration;

    fn ctx(responder: Responder) -> TurnContext {
        TurnContext {
            responder: Arc::new(responder),
            limiter: Arc::new(Semaphore::new(1)),
            cancel: CancellationToken::new(),
            session_id: Uuid::new_v4(),
        }
    }

    async fn collect(stream: TurnStream) -> Vec<Result<TurnEvent, TurnError>> {
        stream.collect().await
    }

    fn assistant_text(pair: &Pair) -> Option<&str> {
        pair.assistant.as_ref().and_then(Content::as_text)
    }

    #[tokio::test]
    async fn echo_turn_in_tuples_format() {
        let responder = Responder::sync(|req| {
            let text = req.message.text_content().unwrap_or("").to_string();
            Ok(Reply::Text(text))
        });
        let input = TurnInput::from("hi");
        let transcript = Transcript::new(WireFormat::Tuples).append_input(&input);

        let events = collect(run(input, transcript, ctx(responder))).await;
        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(
            serde_json::to_value(&event.transcript).unwrap(),
            serde_json::json!([["hi", "hi"]])
        );
    }

    #[tokio::test]
    async fn plain_turn_grows_messages_by_two_records() {
        let responder = Responder::async_fn(|_| async { Ok(Reply::text("there")) });
        let input = TurnInput::from("hi");
        let transcript = Transcript::new(WireFormat::Messages).append_input(&input);

        let events = collect(run(input, transcript, ctx(responder))).await;
        assert_eq!(events.len(), 1);
        let final_transcript = &events[0].as_ref().unwrap().transcript;
        assert_eq!(final_transcript.len(), 2);
        // Plain-string replies are wrapped into assistant records.
        let Transcript::Messages(records) = final_transcript else {
            panic!("expected messages format");
        };
        assert_eq!(records[1], Record::assistant("there"));
    }

    #[tokio::test]
    async fn streaming_yields_one_snapshot_per_reply() {
        let responder =
            Responder::sync_stream(|_| ["a", "b", "c"].into_iter().map(|s| Ok(Reply::text(s))));
        let input = TurnInput::from("hi");
        let transcript = Transcript::new(WireFormat::Tuples).append_input(&input);

        let events = collect(run(input, transcript, ctx(responder))).await;
        assert_eq!(events.len(), 3);
        for (event, expected) in events.iter().zip(["a", "b", "c"]) {
            let event = event.as_ref().unwrap();
            let Transcript::Tuples(pairs) = &event.transcript else {
                panic!("expected tuples format");
            };
            assert_eq!(pairs.len(), 1);
            assert_eq!(assistant_text(&pairs[0]), Some(expected));
        }
    }

    #[tokio::test]
    async fn stop_without_yield_emits_one_null_snapshot() {
        let responder = Responder::sync_stream(|_| std::iter::empty());
        let input = TurnInput::from("hi");
        let transcript = Transcript::new(WireFormat::Tuples).append_input(&input);

        let events = collect(run(input, transcript, ctx(responder))).await;
        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert!(event.reply.is_none());
        let Transcript::Tuples(pairs) = &event.transcript else {
            panic!("expected tuples format");
        };
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].user, Some(Content::text("hi")));
        assert_eq!(pairs[0].assistant, None);
    }

    #[tokio::test]
    async fn multimodal_turn_in_messages_format() {
        let responder = Responder::async_fn(|_| async { Ok(Reply::text("a cat")) });
        let input = TurnInput::multimodal(
            Some("describe".into()),
            vec![crate::transcript::FileRef::new("img.png")],
        );
        let transcript = Transcript::new(WireFormat::Messages).append_input(&input);

        let events = collect(run(input, transcript, ctx(responder))).await;
        let final_transcript = &events.last().unwrap().as_ref().unwrap().transcript;
        assert_eq!(
            serde_json::to_value(final_transcript).unwrap(),
            serde_json::json!([
                {"role": "user", "content": {"path": "img.png"}},
                {"role": "user", "content": "describe"},
                {"role": "assistant", "content": "a cat"},
            ])
        );
    }

    #[tokio::test]
    async fn responder_error_is_forwarded_and_ends_the_stream() {
        let responder = Responder::sync(|_| Err("model exploded".into()));
        let input = TurnInput::from("hi");
        let transcript = Transcript::new(WireFormat::Tuples).append_input(&input);

        let events = collect(run(input, transcript, ctx(responder))).await;
        assert_eq!(events.len(), 1);
        let error = events[0].as_ref().unwrap_err();
        let TurnError::Responder(source) = error;
        assert_eq!(source.to_string(), "model exploded");
    }

    #[tokio::test]
    async fn cancellation_stops_emission_and_keeps_last_snapshot() {
        let responder = Responder::async_stream(|_| {
            stream::unfold(0u32, |n| async move {
                if n > 0 {
                    // Never settles; only cancellation ends the turn.
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Some((Ok(Reply::text("partial")), n + 1))
            })
        });
        let input = TurnInput::from("hi");
        let transcript = Transcript::new(WireFormat::Tuples).append_input(&input);
        let ctx = ctx(responder);
        let cancel = ctx.cancel.clone();

        let mut stream = run(input, transcript, ctx);
        let first = stream.next().await.unwrap().unwrap();
        let Transcript::Tuples(pairs) = &first.transcript else {
            panic!("expected tuples format");
        };
        assert_eq!(assistant_text(&pairs[0]), Some("partial"));

        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
