//! Validation & routing
//!
//! ```text
//! envelope ─▶ validate ─┬─▶ rejected (logged, counted)
//!                       └─▶ stale? ─┬─▶ discarded (counted)
//!                                   └─▶ storage ─▶ alarm engine ─▶ dispatcher
//! ```
//!
//! Storage failures are logged and counted but never stop the reading from
//! reaching the alarm engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::validation::{MessageValidator, ValidationError};
use crate::alarm::{AlarmEngine, Evaluation};
use crate::publisher::Envelope;
use crate::storage::StorageSink;
use crate::types::Reading;

/// Counters for everything the pipeline has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub received: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Rejections by [`ValidationError::reason`].
    pub rejected_by_reason: BTreeMap<&'static str, u64>,
    pub stale: u64,
    pub storage_failures: u64,
    pub alarm_transitions: u64,
    pub dispatch_failures: u64,
    pub active_alarms: usize,
}

/// Outcome of routing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Accepted(Evaluation),
    Rejected(ValidationError),
    Stale { sequence: u64, last: u64 },
}

pub struct ValidationPipeline {
    validator: MessageValidator,
    storage: Arc<dyn StorageSink>,
    engine: AlarmEngine,
    stats: PipelineStats,
}

impl ValidationPipeline {
    pub fn new(validator: MessageValidator, storage: Arc<dyn StorageSink>, engine: AlarmEngine) -> Self {
        Self {
            validator,
            storage,
            engine,
            stats: PipelineStats::default(),
        }
    }

    /// Validate one envelope against pipeline time `now` and route it.
    pub async fn handle(&mut self, envelope: &Envelope, now: DateTime<Utc>) -> Routed {
        self.stats.received += 1;
        match self.validator.validate(envelope, now) {
            Ok(reading) => self.route(reading).await,
            Err(e) => {
                debug!(channel = %envelope.channel, error = %e, "[Pipeline] Rejected message");
                self.count_rejection(&e);
                Routed::Rejected(e)
            }
        }
    }

    /// Count input that never parsed as an envelope.
    pub fn reject_malformed(&mut self, detail: String) -> Routed {
        self.stats.received += 1;
        let e = ValidationError::Malformed(detail);
        debug!(error = %e, "[Pipeline] Rejected message");
        self.count_rejection(&e);
        Routed::Rejected(e)
    }

    async fn route(&mut self, reading: Reading) -> Routed {
        let last_seen = self.engine.last_sequence(&reading.key);
        if let Some(last) = last_seen.filter(|&last| reading.sequence <= last) {
            self.stats.stale += 1;
            debug!(
                channel = %reading.key,
                sequence = reading.sequence,
                last = last,
                "[Pipeline] Discarding stale reading"
            );
            return Routed::Stale {
                sequence: reading.sequence,
                last,
            };
        }

        self.stats.accepted += 1;

        if let Err(e) = self.storage.write(&reading).await {
            self.stats.storage_failures += 1;
            warn!(
                channel = %reading.key,
                sink = self.storage.name(),
                error = %e,
                "[Pipeline] Storage write failed"
            );
        }

        Routed::Accepted(self.engine.process(&reading).await)
    }

    fn count_rejection(&mut self, e: &ValidationError) {
        self.stats.rejected += 1;
        *self.stats.rejected_by_reason.entry(e.reason()).or_insert(0) += 1;
    }

    pub fn received(&self) -> u64 {
        self.stats.received
    }

    pub fn engine(&self) -> &AlarmEngine {
        &self.engine
    }

    /// Counters including the alarm engine's.
    pub fn stats(&self) -> PipelineStats {
        let alarm = self.engine.stats();
        PipelineStats {
            alarm_transitions: alarm.transitions,
            dispatch_failures: alarm.dispatch_failures,
            active_alarms: self.engine.active_alarms(),
            ..self.stats.clone()
        }
    }
}
