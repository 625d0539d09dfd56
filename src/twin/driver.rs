//! Fixed-period tick loop driving the generator.

use chrono::Utc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::TwinGenerator;
use crate::publisher::BatchSender;

/// Runs the generator on a `tokio::time::interval`, handing each tick's
/// batch to the publisher without waiting.
pub struct SimulationDriver {
    generator: TwinGenerator,
    batches: BatchSender,
    period: Duration,
    max_ticks: Option<u64>,
    cancel: CancellationToken,
}

impl SimulationDriver {
    pub fn new(
        generator: TwinGenerator,
        batches: BatchSender,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            generator,
            batches,
            period,
            max_ticks: None,
            cancel,
        }
    }

    /// Stop after `ticks` ticks instead of running until cancelled.
    pub fn with_max_ticks(mut self, ticks: Option<u64>) -> Self {
        self.max_ticks = ticks;
        self
    }

    /// Tick until cancelled or the tick limit is reached. Returns the
    /// generator so callers can inspect final state.
    pub async fn run(mut self) -> TwinGenerator {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            period_ms = self.period.as_millis() as u64,
            seed = self.generator.seed(),
            max_ticks = ?self.max_ticks,
            "[Simulation] Tick loop started"
        );

        loop {
            if self
                .max_ticks
                .is_some_and(|max| self.generator.ticks_elapsed() >= max)
            {
                info!(ticks = self.generator.ticks_elapsed(), "[Simulation] Tick limit reached");
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("[Simulation] Shutdown signal received");
                    break;
                }
                _ = interval.tick() => {}
            }

            let batch = self.generator.tick(Utc::now());
            let size = batch.len();
            self.batches.offer(batch);

            if self.generator.ticks_elapsed() % 60 == 0 {
                let (nominal, degrading, faulted) = self.generator.mode_counts();
                debug!(
                    tick = self.generator.ticks_elapsed(),
                    readings = size,
                    nominal = nominal,
                    degrading = degrading,
                    faulted = faulted,
                    "[Simulation] Plant status"
                );
            }
        }

        self.generator
    }
}
