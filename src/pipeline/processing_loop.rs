//! Message processing loop shared by the bus and stdin input modes.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::router::{PipelineStats, ValidationPipeline};
use super::source::{MessageEvent, MessageSource};

/// Messages between periodic status lines.
const STATUS_EVERY: u64 = 10_000;

/// Drives a [`ValidationPipeline`] from a [`MessageSource`] until the
/// source is exhausted or the token is cancelled.
pub struct ProcessingLoop {
    pipeline: ValidationPipeline,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(pipeline: ValidationPipeline, cancel_token: CancellationToken) -> Self {
        Self {
            pipeline,
            cancel_token,
        }
    }

    /// Run until EOF, a source error, or cancellation. Returns final stats.
    pub async fn run<S: MessageSource>(mut self, source: &mut S) -> PipelineStats {
        info!("[Pipeline] Consuming messages from {}", source.source_name());

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[Pipeline] Shutdown signal received");
                    break;
                }
                result = source.next_message() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!("[Pipeline] Source error: {}", e);
                            break;
                        }
                    }
                }
            };

            match event {
                MessageEvent::Message(envelope) => {
                    self.pipeline.handle(&envelope, Utc::now()).await;
                }
                MessageEvent::Malformed(detail) => {
                    self.pipeline.reject_malformed(detail);
                }
                MessageEvent::Eof => {
                    info!("[Pipeline] Source reached end");
                    break;
                }
            }

            if self.pipeline.received() % STATUS_EVERY == 0 {
                log_stats(&self.pipeline.stats());
            }
        }

        let stats = self.pipeline.stats();
        log_stats(&stats);
        stats
    }
}

fn log_stats(stats: &PipelineStats) {
    info!(
        received = stats.received,
        accepted = stats.accepted,
        rejected = stats.rejected,
        stale = stats.stale,
        storage_failures = stats.storage_failures,
        alarm_transitions = stats.alarm_transitions,
        active_alarms = stats.active_alarms,
        "[Pipeline] Status"
    );
}
