//! Message transports
//!
//! The publisher only needs "put this envelope on this channel". Two
//! transports ship with the crate: an in-process bounded bus feeding the
//! validation pipeline, and a JSON-lines writer on stdout that lets the
//! `simulation` binary be piped into `twinpulse --stdin`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter, Stdout};
use tokio::sync::{mpsc, Mutex};

/// One message on the wire: channel name plus JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(channel: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }
}

/// Transport-level publish failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Temporary: the broker/consumer cannot take the message right now.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// Permanent: the reading cannot be addressed or encoded.
    #[error("Reading cannot be routed: {0}")]
    Unroutable(String),

    /// Permanent: the receiving side is gone.
    #[error("Transport closed")]
    Closed,

    #[error("Envelope serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }
}

/// Where published envelopes go.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// In-process bus
// ============================================================================

/// Bounded in-process bus. A full queue reports `Unavailable` instead of
/// waiting, so a slow consumer turns into publisher retries and drops.
#[derive(Clone)]
pub struct InMemoryBus {
    tx: mpsc::Sender<Envelope>,
}

impl InMemoryBus {
    /// Create a bus holding at most `capacity` undelivered envelopes.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for InMemoryBus {
    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.tx.try_send(envelope.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Unavailable("bus full".to_string()),
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

// ============================================================================
// JSON lines on stdout
// ============================================================================

/// Writes one JSON envelope per line to stdout.
pub struct LineTransport {
    out: Mutex<BufWriter<Stdout>>,
}

impl LineTransport {
    pub fn stdout() -> Self {
        Self {
            out: Mutex::new(BufWriter::new(tokio::io::stdout())),
        }
    }
}

#[async_trait]
impl Transport for LineTransport {
    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(envelope)?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        let write = async {
            out.write_all(&line).await?;
            out.flush().await
        };
        write.await.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe => TransportError::Closed,
            _ => TransportError::Unavailable(e.to_string()),
        })
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn bus_delivers_in_order() {
        let (bus, mut rx) = InMemoryBus::new(4);
        for i in 0..3 {
            bus.publish(&Envelope::new("a/b/c/d", json!({ "i": i }))).await.unwrap();
        }
        for i in 0..3 {
            assert_eq!(rx.recv().await.unwrap().payload["i"], i);
        }
    }

    #[tokio::test]
    async fn full_bus_is_transient() {
        let (bus, _rx) = InMemoryBus::new(1);
        let env = Envelope::new("x", json!({}));
        bus.publish(&env).await.unwrap();
        let err = bus.publish(&env).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn dropped_receiver_is_permanent() {
        let (bus, rx) = InMemoryBus::new(1);
        drop(rx);
        let err = bus.publish(&Envelope::new("x", json!({}))).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(!err.is_transient());
    }
}
