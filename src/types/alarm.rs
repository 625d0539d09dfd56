//! Alarm severities and notification events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChannelKey;

/// Alarm severity for one (asset, sensor) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Normal => write!(f, "NORMAL"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Which way a metric goes bad.
///
/// `Rising` metrics (temperature, vibration) alarm at or above their
/// thresholds; `Falling` metrics (oil pressure, flow) alarm at or below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    #[default]
    Rising,
    Falling,
}

impl ThresholdDirection {
    /// +1.0 for rising metrics, -1.0 for falling ones.
    pub fn sign(self) -> f64 {
        match self {
            ThresholdDirection::Rising => 1.0,
            ThresholdDirection::Falling => -1.0,
        }
    }

    /// True when `value` has reached `limit` in the bad direction.
    pub fn breaches(self, value: f64, limit: f64) -> bool {
        match self {
            ThresholdDirection::Rising => value >= limit,
            ThresholdDirection::Falling => value <= limit,
        }
    }

    /// True when `value` is back past `limit` by more than `margin`.
    pub fn clears(self, value: f64, limit: f64, margin: f64) -> bool {
        match self {
            ThresholdDirection::Rising => value < limit - margin,
            ThresholdDirection::Falling => value > limit + margin,
        }
    }
}

/// Kind of severity change, for human-readable notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Enter,
    Escalate,
    DeEscalate,
    Clear,
}

impl Transition {
    pub fn between(previous: Severity, next: Severity) -> Self {
        match (previous, next) {
            (_, Severity::Normal) => Transition::Clear,
            (Severity::Normal, _) => Transition::Enter,
            (Severity::Warning, Severity::Critical) => Transition::Escalate,
            _ => Transition::DeEscalate,
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Enter => write!(f, "entered"),
            Transition::Escalate => write!(f, "escalated to"),
            Transition::DeEscalate => write!(f, "de-escalated to"),
            Transition::Clear => write!(f, "cleared to"),
        }
    }
}

/// Notification emitted on every severity transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub key: ChannelKey,
    pub severity: Severity,
    pub previous: Severity,
    pub transition: Transition,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

impl AlarmEvent {
    /// One-line message for operators.
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} {} {} (value {:.3} {}, was {}) at {}",
            self.severity,
            self.key,
            self.transition,
            self.severity,
            self.value,
            self.unit,
            self.previous,
            self.timestamp.to_rfc3339(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falling_direction_mirrors_comparisons() {
        let d = ThresholdDirection::Falling;
        assert!(d.breaches(2.0, 3.0));
        assert!(d.breaches(3.0, 3.0));
        assert!(!d.breaches(3.1, 3.0));
        assert!(d.clears(3.6, 3.0, 0.5));
        assert!(!d.clears(3.4, 3.0, 0.5));
    }

    #[test]
    fn transition_kinds() {
        assert_eq!(Transition::between(Severity::Normal, Severity::Critical), Transition::Enter);
        assert_eq!(Transition::between(Severity::Warning, Severity::Critical), Transition::Escalate);
        assert_eq!(Transition::between(Severity::Critical, Severity::Warning), Transition::DeEscalate);
        assert_eq!(Transition::between(Severity::Critical, Severity::Normal), Transition::Clear);
    }
}
