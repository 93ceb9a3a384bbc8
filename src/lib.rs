//! Headless chat-session engine.
//!
//! Wires a user-supplied response function into per-turn transcript state:
//! two wire formats (tuple pairs and flat role/content records), streaming
//! and single-shot responders, cancellation, and undo/retry over the
//! transcript tail. Rendering, routing, and queueing belong to the
//! embedding application; this crate only produces the transcript
//! snapshots to display.
//!
//! ```
//! use colloquy::{ChatSession, Reply, Responder, TurnInput};
//! use futures::StreamExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let responder = Responder::sync(|req| {
//!     let text = req.message.text_content().unwrap_or("").to_string();
//!     Ok(Reply::Text(text))
//! });
//! let session = ChatSession::builder(responder).build().unwrap();
//!
//! let mut turn = session.submit(TurnInput::from("hi")).unwrap();
//! while let Some(event) = turn.next().await {
//!     let snapshot = event.unwrap().transcript;
//!     assert_eq!(serde_json::to_value(snapshot).unwrap(),
//!                serde_json::json!([["hi", "hi"]]));
//! }
//! # }
//! ```

pub mod error;
pub mod replay;
pub mod responder;
pub mod session;
pub mod transcript;
pub mod turn;

pub use error::{ConfigError, ResponderError, SessionError, TurnError};
pub use replay::ExampleReplay;
pub use responder::{ChatService, Reply, ReplyResult, Responder, TurnRequest};
pub use session::{ChatSession, ChatSessionBuilder, SessionConfig, SessionTurn};
pub use transcript::{
    turn_span, undo_last, Content, FileRef, MultimodalInput, Pair, Record, Role, Transcript,
    TurnInput, WireFormat,
};
pub use turn::{TurnContext, TurnEvent, TurnState, TurnStream};
