//! Example replay.
//!
//! Runs example prompts through the same turn machinery as a live session,
//! against an empty transcript, so cached example outputs match what a
//! real turn would have produced. Streaming responders keep every
//! snapshot; non-streaming cache storage keeps only the final state.

use crate::error::{ConfigError, TurnError};
use crate::responder::Responder;
use crate::transcript::{Transcript, TurnInput, WireFormat};
use crate::turn::{self, TurnContext};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Replays example inputs against an empty transcript.
pub struct ExampleReplay {
    responder: Arc<Responder>,
    format: WireFormat,
    multimodal: bool,
    limiter: Arc<Semaphore>,
}

impl ExampleReplay {
    pub fn new(responder: Arc<Responder>, format: WireFormat) -> Self {
        Self {
            responder,
            format,
            multimodal: false,
            limiter: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn multimodal(mut self, multimodal: bool) -> Self {
        self.multimodal = multimodal;
        self
    }

    /// Share the blocking-offload limiter with the live sessions.
    pub fn limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Validate a set of example inputs up front. Invalid examples are a
    /// configuration error: fail fast, before anything is replayed.
    pub fn validate(&self, examples: &[TurnInput]) -> Result<(), ConfigError> {
        for (index, example) in examples.iter().enumerate() {
            if example.is_empty() {
                return Err(ConfigError::EmptyExample { index });
            }
            if !self.multimodal && matches!(example, TurnInput::Multimodal(_)) {
                return Err(ConfigError::MultimodalExample { index });
            }
        }
        Ok(())
    }

    /// Replay one example, keeping every snapshot. Streaming caches store
    /// the whole sequence.
    pub async fn run_streaming(&self, example: TurnInput) -> Result<Vec<Transcript>, TurnError> {
        let transcript = Transcript::new(self.format).append_input(&example);
        let ctx = TurnContext {
            responder: Arc::clone(&self.responder),
            limiter: Arc::clone(&self.limiter),
            cancel: CancellationToken::new(),
            session_id: Uuid::new_v4(),
        };
        let mut stream = turn::run(example, transcript, ctx);
        let mut snapshots = Vec::new();
        while let Some(item) = stream.next().await {
            snapshots.push(item?.transcript);
        }
        Ok(snapshots)
    }

    /// Replay one example, keeping only the final state. This is what a
    /// non-streaming cache stores.
    pub async fn run_cached(&self, example: TurnInput) -> Result<Option<Transcript>, TurnError> {
        let mut snapshots = self.run_streaming(example).await?;
        Ok(snapshots.pop())
    }

    /// Replay a batch in order, final states only.
    pub async fn run_all(&self, examples: &[TurnInput]) -> Result<Vec<Transcript>, TurnError> {
        let mut finals = Vec::with_capacity(examples.len());
        for example in examples {
            if let Some(transcript) = self.run_cached(example.clone()).await? {
                finals.push(transcript);
            }
        }
        Ok(finals)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::Reply;
    use crate::transcript::FileRef;

    fn echo() -> Arc<Responder> {
        Arc::new(Responder::sync(|req| {
            let text = req.message.text_content().unwrap_or("").to_string();
            Ok(Reply::Text(text))
        }))
    }

    #[tokio::test]
    async fn replay_runs_against_an_empty_transcript() {
        let replay = ExampleReplay::new(echo(), WireFormat::Tuples);
        let result = replay.run_cached(TurnInput::from("hello")).await.unwrap();
        assert_eq!(
            serde_json::to_value(result.unwrap()).unwrap(),
            serde_json::json!([["hello", "hello"]])
        );
    }

    #[tokio::test]
    async fn streaming_replay_keeps_every_snapshot() {
        let responder = Arc::new(Responder::sync_stream(|_| {
            ["a", "ab", "abc"].into_iter().map(|s| Ok(Reply::text(s)))
        }));
        let replay = ExampleReplay::new(responder, WireFormat::Tuples);

        let snapshots = replay.run_streaming(TurnInput::from("hi")).await.unwrap();
        assert_eq!(snapshots.len(), 3);

        let cached = replay.run_cached(TurnInput::from("hi")).await.unwrap();
        assert_eq!(
            serde_json::to_value(cached.unwrap()).unwrap(),
            serde_json::json!([["hi", "abc"]])
        );
    }

    #[tokio::test]
    async fn batch_replay_preserves_order() {
        let replay = ExampleReplay::new(echo(), WireFormat::Messages);
        let examples = vec![TurnInput::from("one"), TurnInput::from("two")];
        replay.validate(&examples).unwrap();

        let finals = replay.run_all(&examples).await.unwrap();
        assert_eq!(finals.len(), 2);
        assert_eq!(
            serde_json::to_value(&finals[1]).unwrap(),
            serde_json::json!([
                {"role": "user", "content": "two"},
                {"role": "assistant", "content": "two"},
            ])
        );
    }

    #[test]
    fn validation_rejects_bad_examples() {
        let replay = ExampleReplay::new(echo(), WireFormat::Tuples);
        let err = replay.validate(&[TurnInput::from("")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyExample { index: 0 }));

        let multimodal = TurnInput::multimodal(Some("hi".into()), vec![FileRef::new("a.png")]);
        let err = replay.validate(&[TurnInput::from("ok"), multimodal]).unwrap_err();
        assert!(matches!(err, ConfigError::MultimodalExample { index: 1 }));
    }
}
