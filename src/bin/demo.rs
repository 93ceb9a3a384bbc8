//! Interactive terminal demo: an echo bot over a chat session.
//!
//! Reads lines from stdin, streams the echo back word by word, and prints
//! every transcript snapshot as JSON. `COLLOQUY_FORMAT=messages` switches
//! the wire format; `RUST_LOG=colloquy=debug` shows turn lifecycle logs.

use colloquy::{ChatSession, Reply, Responder, TurnInput, WireFormat};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colloquy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let format = match std::env::var("COLLOQUY_FORMAT").as_deref() {
        Ok("messages") => WireFormat::Messages,
        _ => WireFormat::Tuples,
    };

    let responder = Responder::sync_stream(|req| {
        let words: Vec<String> = req
            .message
            .text_content()
            .unwrap_or("")
            .split_whitespace()
            .map(String::from)
            .collect();
        words.into_iter().scan(String::new(), |echoed, word| {
            if !echoed.is_empty() {
                echoed.push(' ');
            }
            echoed.push_str(&word);
            Some(Ok(Reply::text(format!("echo: {echoed}"))))
        })
    });

    let session = ChatSession::builder(responder).format(format).build()?;
    tracing::info!(session = %session.id(), ?format, "echo bot ready (ctrl-d to exit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let mut turn = session.submit(TurnInput::from(line.trim()))?;
        while let Some(event) = turn.next().await {
            match event {
                Ok(event) => println!("{}", serde_json::to_string(&event.transcript)?),
                Err(error) => eprintln!("responder error: {error}"),
            }
        }
    }
    Ok(())
}
