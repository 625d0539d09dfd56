//! Message source abstraction for the validation pipeline.
//!
//! The pipeline reads envelopes either from the in-process bus fed by the
//! publisher, or from JSON lines on stdin (the output of the `simulation`
//! binary):
//!
//! `simulation --seed 7 | twinpulse --stdin`

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::mpsc;

use crate::publisher::Envelope;

/// Events produced by a message source.
#[derive(Debug)]
pub enum MessageEvent {
    /// A syntactically valid envelope; its contents are not yet validated.
    Message(Envelope),
    /// Input that could not even be read as an envelope.
    Malformed(String),
    /// No more messages (bus closed, or EOF).
    Eof,
}

/// Trait abstracting where messages come from.
///
/// The processing loop calls [`next_message`](MessageSource::next_message)
/// in a `select!` with cancellation.
#[async_trait]
pub trait MessageSource: Send {
    /// Returns `MessageEvent::Eof` when no more data is available.
    /// Returns `Err` on unrecoverable read errors.
    async fn next_message(&mut self) -> Result<MessageEvent>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// In-process bus
// ============================================================================

/// Receiving end of an [`InMemoryBus`](crate::publisher::InMemoryBus).
pub struct BusSource {
    rx: mpsc::Receiver<Envelope>,
}

impl BusSource {
    pub fn new(rx: mpsc::Receiver<Envelope>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl MessageSource for BusSource {
    async fn next_message(&mut self) -> Result<MessageEvent> {
        Ok(match self.rx.recv().await {
            Some(envelope) => MessageEvent::Message(envelope),
            None => MessageEvent::Eof,
        })
    }

    fn source_name(&self) -> &str {
        "bus"
    }
}

// ============================================================================
// JSON lines
// ============================================================================

/// Reads one JSON envelope per line. Blank lines are skipped.
pub struct LineSource<R> {
    reader: R,
    line_buffer: String,
    name: &'static str,
}

/// Line source over the process's stdin.
pub type StdinSource = LineSource<BufReader<Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        LineSource::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl<R: AsyncBufRead + Unpin + Send> LineSource<R> {
    pub fn new(reader: R, name: &'static str) -> Self {
        Self {
            reader,
            line_buffer: String::with_capacity(512),
            name,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> MessageSource for LineSource<R> {
    async fn next_message(&mut self) -> Result<MessageEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(MessageEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            return Ok(match serde_json::from_str::<Envelope>(line) {
                Ok(envelope) => MessageEvent::Message(envelope),
                Err(e) => MessageEvent::Malformed(e.to_string()),
            });
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn line_source_parses_and_flags_garbage() {
        let input: &[u8] = b"{\"channel\":\"sector_1/line_1/asset_1/vibration\",\"payload\":{\"value\":1}}\n\nnot json\n";
        let mut source = LineSource::new(input, "test");

        match source.next_message().await.unwrap() {
            MessageEvent::Message(env) => assert_eq!(env.channel, "sector_1/line_1/asset_1/vibration"),
            other => panic!("expected message, got {other:?}"),
        }
        assert!(matches!(source.next_message().await.unwrap(), MessageEvent::Malformed(_)));
        assert!(matches!(source.next_message().await.unwrap(), MessageEvent::Eof));
    }

    #[tokio::test]
    async fn bus_source_ends_when_senders_drop() {
        let (tx, rx) = mpsc::channel(2);
        let mut source = BusSource::new(rx);
        tx.send(Envelope::new("x", serde_json::json!({}))).await.unwrap();
        drop(tx);
        assert!(matches!(source.next_message().await.unwrap(), MessageEvent::Message(_)));
        assert!(matches!(source.next_message().await.unwrap(), MessageEvent::Eof));
    }
}
