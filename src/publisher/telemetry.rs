//! Telemetry publisher task
//!
//! The tick loop hands each batch over a single-slot channel and never
//! waits: if the previous batch is still being published, the new one is
//! dropped whole. Each reading is retried with exponential backoff while
//! the transport reports a transient failure; once a reading exhausts its
//! attempts the rest of the batch is abandoned. A whole batch never runs
//! past the tick deadline.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::payload::encode;
use super::transport::{Transport, TransportError};
use crate::config::PublisherConfig;
use crate::topology::TopologyRegistry;
use crate::types::Reading;

// ============================================================================
// Statistics
// ============================================================================

/// Publisher counters, shared between the tick loop and the publisher task.
#[derive(Debug, Default)]
pub struct PublisherStats {
    published: AtomicU64,
    dropped: AtomicU64,
    retries: AtomicU64,
    batches_dropped: AtomicU64,
    deadline_overruns: AtomicU64,
}

/// Point-in-time copy of [`PublisherStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherSnapshot {
    pub published: u64,
    pub dropped: u64,
    pub retries: u64,
    pub batches_dropped: u64,
    pub deadline_overruns: u64,
}

impl PublisherStats {
    pub fn snapshot(&self) -> PublisherSnapshot {
        PublisherSnapshot {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            deadline_overruns: self.deadline_overruns.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Batch hand-off
// ============================================================================

/// Tick-loop side of the single-slot batch channel.
///
/// The slot stays taken from the moment a batch is offered until the
/// publisher task has finished with it, so a batch is either queued or
/// being published, never both.
#[derive(Clone)]
pub struct BatchSender {
    tx: mpsc::Sender<Vec<Reading>>,
    in_flight: Arc<AtomicBool>,
    stats: Arc<PublisherStats>,
}

impl BatchSender {
    /// Offer a batch without waiting. Returns false if it was dropped.
    pub fn offer(&self, batch: Vec<Reading>) -> bool {
        let len = batch.len() as u64;
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.batches_dropped.fetch_add(1, Ordering::Relaxed);
            self.stats.dropped.fetch_add(len, Ordering::Relaxed);
            warn!(readings = len, "[Publisher] Previous batch still in flight, dropping tick");
            return false;
        }

        match self.tx.try_send(batch) {
            Ok(()) => true,
            Err(_) => {
                self.in_flight.store(false, Ordering::Release);
                self.stats.dropped.fetch_add(len, Ordering::Relaxed);
                debug!("[Publisher] Publisher task gone, batch discarded");
                false
            }
        }
    }

    /// Whether a batch is queued or still being published.
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Retry delay before attempt `retry + 1`: `initial · 2^(retry−1)`, capped.
pub fn backoff_delay(retry: u32, initial_ms: u64, max_ms: u64) -> Duration {
    let factor = 2u64.saturating_pow(retry.saturating_sub(1));
    Duration::from_millis(initial_ms.saturating_mul(factor).min(max_ms))
}

/// Result of publishing one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub published: usize,
    pub dropped: usize,
    pub timed_out: bool,
}

// ============================================================================
// Publisher
// ============================================================================

pub struct TelemetryPublisher {
    transport: Arc<dyn Transport>,
    registry: Arc<TopologyRegistry>,
    config: PublisherConfig,
    stats: Arc<PublisherStats>,
    in_flight: Arc<AtomicBool>,
}

impl TelemetryPublisher {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<TopologyRegistry>,
        config: &PublisherConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            config: config.clone(),
            stats: Arc::new(PublisherStats::default()),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stats(&self) -> Arc<PublisherStats> {
        Arc::clone(&self.stats)
    }

    /// Create the single-slot channel between the tick loop and [`run`](Self::run).
    pub fn batch_channel(&self) -> (BatchSender, mpsc::Receiver<Vec<Reading>>) {
        let (tx, rx) = mpsc::channel(1);
        (
            BatchSender {
                tx,
                in_flight: Arc::clone(&self.in_flight),
                stats: Arc::clone(&self.stats),
            },
            rx,
        )
    }

    /// Publish one reading, retrying transient failures with backoff.
    pub async fn publish(&self, reading: &Reading) -> Result<(), TransportError> {
        let template = self
            .registry
            .resolve_template(&reading.key.sensor_type)
            .map_err(|e| TransportError::Unroutable(e.to_string()))?;
        let envelope = encode(reading, template)?;

        let mut attempt = 1;
        loop {
            match self.transport.publish(&envelope).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = backoff_delay(
                        attempt,
                        self.config.initial_backoff_ms,
                        self.config.max_backoff_ms,
                    );
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        channel = %envelope.channel,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "[Publisher] Transport unavailable, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_all(&self, batch: &[Reading], sent: &mut usize) -> Result<(), TransportError> {
        for reading in batch {
            self.publish(reading).await?;
            *sent += 1;
        }
        Ok(())
    }

    /// Publish a batch in order, giving up at `deadline`.
    ///
    /// The first reading that exhausts its retries ends the batch; everything
    /// not yet sent is counted as dropped.
    pub async fn publish_batch(&self, batch: &[Reading], deadline: Duration) -> BatchReport {
        let mut sent = 0usize;
        let outcome = tokio::time::timeout(deadline, self.send_all(batch, &mut sent)).await;

        let dropped = batch.len() - sent;
        self.stats.published.fetch_add(sent as u64, Ordering::Relaxed);
        self.stats.dropped.fetch_add(dropped as u64, Ordering::Relaxed);

        let timed_out = match outcome {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!(
                    transport = self.transport.name(),
                    dropped = dropped,
                    error = %e,
                    "[Publisher] Retries exhausted, dropping rest of batch"
                );
                false
            }
            Err(_) => {
                self.stats.deadline_overruns.fetch_add(1, Ordering::Relaxed);
                warn!(
                    transport = self.transport.name(),
                    dropped = dropped,
                    deadline_ms = deadline.as_millis() as u64,
                    "[Publisher] Tick deadline reached, abandoning batch"
                );
                true
            }
        };

        BatchReport {
            published: sent,
            dropped,
            timed_out,
        }
    }

    /// Consume batches until cancelled or the tick loop hangs up.
    pub async fn run(
        self,
        mut batches: mpsc::Receiver<Vec<Reading>>,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> PublisherSnapshot {
        info!(transport = self.transport.name(), "[Publisher] Started");

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                next = batches.recv() => match next {
                    Some(batch) => batch,
                    None => break,
                },
            };
            self.publish_batch(&batch, deadline).await;
            self.in_flight.store(false, Ordering::Release);
        }

        let snapshot = self.stats.snapshot();
        info!(
            published = snapshot.published,
            dropped = snapshot.dropped,
            retries = snapshot.retries,
            batches_dropped = snapshot.batches_dropped,
            "[Publisher] Stopped"
        );
        snapshot
    }
}
