//! Alarm Engine
//!
//! Per-channel hysteresis state machine over three severities:
//!
//! ```text
//!            ≥ warning             ≥ critical
//!   NORMAL ───────────▶ WARNING ────────────▶ CRITICAL
//!      ▲  < warning−m      │    < critical−m     │
//!      └───────────────────┘◀────────────────────┘
//!      ▲                 < warning−m             │
//!      └─────────────────────────────────────────┘
//! ```
//!
//! Falling metrics mirror the comparisons. Upgrades happen as soon as a
//! threshold is reached; downgrades need the value back past the threshold
//! by the template's hysteresis margin, so a signal hovering just under a
//! threshold does not flap.
//!
//! State lives in an arena of slots addressed through a key → index map. The
//! engine is owned by a single pipeline task, so no locking is needed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::dispatcher::NotificationDispatcher;
use crate::topology::{SensorTemplate, TopologyRegistry};
use crate::types::{AlarmEvent, ChannelKey, Reading, Severity, Transition};

/// Next severity for `value` given the current severity.
pub fn next_severity(current: Severity, value: f64, template: &SensorTemplate) -> Severity {
    let dir = template.direction;
    let margin = template.margin;
    match current {
        Severity::Normal => {
            if dir.breaches(value, template.critical) {
                Severity::Critical
            } else if dir.breaches(value, template.warning) {
                Severity::Warning
            } else {
                Severity::Normal
            }
        }
        Severity::Warning => {
            if dir.breaches(value, template.critical) {
                Severity::Critical
            } else if dir.clears(value, template.warning, margin) {
                Severity::Normal
            } else {
                Severity::Warning
            }
        }
        Severity::Critical => {
            if dir.clears(value, template.warning, margin) {
                Severity::Normal
            } else if dir.clears(value, template.critical, margin) {
                Severity::Warning
            } else {
                Severity::Critical
            }
        }
    }
}

#[derive(Debug, Clone)]
struct AlarmSlot {
    key: ChannelKey,
    severity: Severity,
    last_sequence: u64,
    last_value: f64,
    since: DateTime<Utc>,
}

/// What happened to one reading.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Severity did not change.
    Unchanged(Severity),
    /// Severity changed; the event must be dispatched.
    Transition(AlarmEvent),
    /// Sequence not newer than the last one seen for this channel.
    Stale { last: u64 },
    /// No template for the reading's sensor type.
    Untracked,
}

/// Current alarm state for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmStatus {
    pub key: ChannelKey,
    pub severity: Severity,
    pub last_value: f64,
    pub last_sequence: u64,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlarmStats {
    pub evaluated: u64,
    pub transitions: u64,
    pub stale: u64,
    pub dispatch_failures: u64,
}

pub struct AlarmEngine {
    registry: Arc<TopologyRegistry>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    slots: Vec<AlarmSlot>,
    index: HashMap<ChannelKey, usize>,
    stats: AlarmStats,
}

impl AlarmEngine {
    pub fn new(registry: Arc<TopologyRegistry>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        let capacity = registry.sensor_count();
        Self {
            registry,
            dispatcher,
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            stats: AlarmStats::default(),
        }
    }

    /// Last sequence evaluated for `key`, if any.
    pub fn last_sequence(&self, key: &ChannelKey) -> Option<u64> {
        self.index.get(key).map(|&i| self.slots[i].last_sequence)
    }

    /// Advance the channel's state machine. Does not dispatch.
    pub fn evaluate(&mut self, reading: &Reading) -> Evaluation {
        let template = match self.registry.resolve_template(&reading.key.sensor_type) {
            Ok(t) => t,
            Err(_) => return Evaluation::Untracked,
        };

        let slot_index = match self.index.get(&reading.key) {
            Some(&i) => {
                let last = self.slots[i].last_sequence;
                if reading.sequence <= last {
                    self.stats.stale += 1;
                    return Evaluation::Stale { last };
                }
                i
            }
            // First reading for the channel: any sequence is newer.
            None => {
                self.slots.push(AlarmSlot {
                    key: reading.key.clone(),
                    severity: Severity::Normal,
                    last_sequence: reading.sequence,
                    last_value: reading.value,
                    since: reading.timestamp,
                });
                let i = self.slots.len() - 1;
                self.index.insert(reading.key.clone(), i);
                i
            }
        };
        let slot = &mut self.slots[slot_index];

        self.stats.evaluated += 1;
        slot.last_sequence = reading.sequence;
        slot.last_value = reading.value;

        let previous = slot.severity;
        let next = next_severity(previous, reading.value, template);
        if next == previous {
            return Evaluation::Unchanged(next);
        }

        slot.severity = next;
        slot.since = reading.timestamp;
        self.stats.transitions += 1;

        Evaluation::Transition(AlarmEvent {
            key: reading.key.clone(),
            severity: next,
            previous,
            transition: Transition::between(previous, next),
            value: reading.value,
            unit: template.unit.clone(),
            timestamp: reading.timestamp,
            sequence: reading.sequence,
        })
    }

    /// Evaluate, then dispatch any transition exactly once.
    ///
    /// A dispatch failure is logged and counted; the new severity stays
    /// committed either way.
    pub async fn process(&mut self, reading: &Reading) -> Evaluation {
        let evaluation = self.evaluate(reading);
        if let Evaluation::Transition(ref event) = evaluation {
            debug!(
                channel = %event.key,
                from = %event.previous,
                to = %event.severity,
                value = event.value,
                "[AlarmEngine] Severity transition"
            );
            if let Err(e) = self.dispatcher.notify(event).await {
                self.stats.dispatch_failures += 1;
                warn!(
                    channel = %event.key,
                    dispatcher = self.dispatcher.name(),
                    error = %e,
                    "[AlarmEngine] Notification dispatch failed"
                );
            }
        }
        evaluation
    }

    /// Current severity of a channel (normal when never seen).
    pub fn severity(&self, key: &ChannelKey) -> Severity {
        self.index
            .get(key)
            .map_or(Severity::Normal, |&i| self.slots[i].severity)
    }

    /// State of every channel seen so far, in first-seen order.
    pub fn snapshot(&self) -> Vec<AlarmStatus> {
        self.slots
            .iter()
            .map(|s| AlarmStatus {
                key: s.key.clone(),
                severity: s.severity,
                last_value: s.last_value,
                last_sequence: s.last_sequence,
                since: s.since,
            })
            .collect()
    }

    /// Channels currently at warning or above.
    pub fn active_alarms(&self) -> usize {
        self.slots.iter().filter(|s| s.severity > Severity::Normal).count()
    }

    pub fn stats(&self) -> AlarmStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::dispatcher::DispatchError;
    use crate::config::PlantConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const PLANT: &str = r#"
[topology.generated]
sectors = 1
lines_per_sector = 1
assets_per_line = 1
sensors = ["gauge", "oil_pressure"]

[templates.gauge]
unit = "u"
baseline = 10.0
noise = 0.1
warning = 15.0
critical = 20.0
hysteresis_margin = 1.0

[templates.oil_pressure]
unit = "bar"
baseline = 4.0
warning = 2.5
critical = 1.5
direction = "falling"
hysteresis_margin = 0.2
"#;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<AlarmEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationDispatcher for Recorder {
        async fn notify(&self, event: &AlarmEvent) -> Result<(), DispatchError> {
            self.events.lock().unwrap().push(event.clone());
            if self.fail {
                Err(DispatchError::Unavailable("test".to_string()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    fn engine(recorder: Arc<Recorder>) -> AlarmEngine {
        let config = PlantConfig::from_toml_str(PLANT).unwrap();
        let registry = Arc::new(TopologyRegistry::load(&config).unwrap());
        AlarmEngine::new(registry, recorder)
    }

    fn gauge(seq: u64, value: f64) -> Reading {
        Reading::new(
            ChannelKey::new("sector_1", "line_1", "asset_1", "gauge"),
            value,
            Utc::now(),
            seq,
        )
    }

    fn template() -> SensorTemplate {
        let config = PlantConfig::from_toml_str(PLANT).unwrap();
        TopologyRegistry::load(&config)
            .unwrap()
            .resolve_template("gauge")
            .unwrap()
            .clone()
    }

    #[test]
    fn transition_table() {
        let t = template();
        use Severity::*;
        let cases = [
            (Normal, 14.9, Normal),
            (Normal, 15.0, Warning),
            (Normal, 20.0, Critical),
            (Warning, 14.5, Warning),
            (Warning, 13.9, Normal),
            (Warning, 20.0, Critical),
            (Critical, 19.5, Critical),
            (Critical, 18.9, Warning),
            (Critical, 13.9, Normal),
            (Critical, 14.0, Warning),
        ];
        for (from, value, to) in cases {
            assert_eq!(next_severity(from, value, &t), to, "{from} at {value}");
        }
    }

    #[test]
    fn no_flapping_inside_margin() {
        let recorder = Arc::new(Recorder::default());
        let mut e = engine(recorder);
        let mut transitions = 0;
        for (i, v) in [15.0, 14.5, 15.2, 14.6, 15.0, 14.5].iter().enumerate() {
            if matches!(e.evaluate(&gauge(i as u64 + 1, *v)), Evaluation::Transition(_)) {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 1);
        assert_eq!(e.severity(&gauge(1, 0.0).key), Severity::Warning);
    }

    #[test]
    fn stale_sequence_is_ignored() {
        let mut e = engine(Arc::new(Recorder::default()));
        e.evaluate(&gauge(5, 22.0));
        assert_eq!(e.evaluate(&gauge(5, 10.0)), Evaluation::Stale { last: 5 });
        assert_eq!(e.evaluate(&gauge(3, 10.0)), Evaluation::Stale { last: 5 });
        assert_eq!(e.severity(&gauge(1, 0.0).key), Severity::Critical);
        assert_eq!(e.stats().stale, 2);
        assert_eq!(e.last_sequence(&gauge(1, 0.0).key), Some(5));
    }

    #[test]
    fn first_sequence_zero_is_evaluated() {
        let mut e = engine(Arc::new(Recorder::default()));
        let key = gauge(0, 0.0).key;
        assert_eq!(e.last_sequence(&key), None);
        assert!(matches!(
            e.evaluate(&gauge(0, 22.0)),
            Evaluation::Transition(ref ev) if ev.severity == Severity::Critical && ev.sequence == 0
        ));
        assert_eq!(e.last_sequence(&key), Some(0));
        assert_eq!(e.evaluate(&gauge(0, 13.0)), Evaluation::Stale { last: 0 });
        assert!(matches!(e.evaluate(&gauge(1, 13.0)), Evaluation::Transition(_)));
        assert_eq!(e.stats().stale, 1);
    }

    #[test]
    fn first_sequence_may_start_high() {
        let mut e = engine(Arc::new(Recorder::default()));
        assert!(matches!(e.evaluate(&gauge(10_000, 16.0)), Evaluation::Transition(_)));
        assert_eq!(e.evaluate(&gauge(9_999, 22.0)), Evaluation::Stale { last: 10_000 });
        assert_eq!(e.evaluate(&gauge(10_001, 15.5)), Evaluation::Unchanged(Severity::Warning));
    }

    #[test]
    fn falling_metric_alarms_low() {
        let mut e = engine(Arc::new(Recorder::default()));
        let key = ChannelKey::new("sector_1", "line_1", "asset_1", "oil_pressure");
        let reading = |seq, value| Reading::new(key.clone(), value, Utc::now(), seq);

        assert!(matches!(e.evaluate(&reading(1, 2.4)), Evaluation::Transition(ref ev) if ev.severity == Severity::Warning));
        assert!(matches!(e.evaluate(&reading(2, 1.5)), Evaluation::Transition(ref ev) if ev.severity == Severity::Critical));
        // 1.6 is not above critical + margin.
        assert_eq!(e.evaluate(&reading(3, 1.6)), Evaluation::Unchanged(Severity::Critical));
        assert!(matches!(e.evaluate(&reading(4, 2.8)), Evaluation::Transition(ref ev) if ev.severity == Severity::Normal));
    }

    #[tokio::test]
    async fn each_transition_dispatched_once() {
        let recorder = Arc::new(Recorder::default());
        let mut e = engine(Arc::clone(&recorder));
        for (seq, v) in [(1, 22.0), (2, 21.5), (3, 23.0), (4, 13.0), (5, 12.0)] {
            e.process(&gauge(seq, v)).await;
        }
        let events = recorder.events.lock().unwrap();
        let severities: Vec<Severity> = events.iter().map(|ev| ev.severity).collect();
        assert_eq!(severities, vec![Severity::Critical, Severity::Normal]);
        assert_eq!(events[1].previous, Severity::Critical);
        assert_eq!(events[1].transition, Transition::Clear);
    }

    #[tokio::test]
    async fn dispatch_failure_still_commits() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let mut e = engine(Arc::clone(&recorder));
        e.process(&gauge(1, 16.0)).await;
        e.process(&gauge(2, 16.5)).await;
        assert_eq!(e.severity(&gauge(1, 0.0).key), Severity::Warning);
        assert_eq!(e.stats().dispatch_failures, 1);
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
        assert_eq!(e.active_alarms(), 1);
    }
}
