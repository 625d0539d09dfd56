//! Telemetry reading

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChannelKey;

/// One sensor sample produced by the digital twin.
///
/// Moved by value from the generator through the publisher and pipeline into
/// storage and the alarm engine. Nothing downstream mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub key: ChannelKey,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Per-sensor sequence number, strictly increasing.
    pub sequence: u64,
}

impl Reading {
    pub fn new(key: ChannelKey, value: f64, timestamp: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            key,
            value,
            timestamp,
            sequence,
        }
    }
}
