//! Inbound message validation
//!
//! A message becomes a [`Reading`] only if its channel is well formed and
//! known to the topology, and its payload carries a finite numeric `value`,
//! a `timestamp` within the clock-skew window and a non-negative integer
//! `sequence`. Anything else in the payload is ignored.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::publisher::Envelope;
use crate::topology::TopologyRegistry;
use crate::types::{ChannelError, ChannelKey, Reading};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("malformed channel '{channel}': {source}")]
    Channel {
        channel: String,
        #[source]
        source: ChannelError,
    },

    #[error("channel '{0}' is not part of the plant topology")]
    UnknownChannel(String),

    #[error("unparseable message: {0}")]
    Malformed(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field 'value' is not a number")]
    NonNumericValue,

    #[error("field 'value' is not finite")]
    NonFiniteValue,

    #[error("invalid timestamp: {0}")]
    BadTimestamp(String),

    #[error("timestamp {timestamp} is {skew_secs}s from pipeline time (max {max_secs}s)")]
    ClockSkew {
        timestamp: DateTime<Utc>,
        skew_secs: i64,
        max_secs: u64,
    },

    #[error("field 'sequence' must be a non-negative integer")]
    BadSequence,
}

impl ValidationError {
    /// Short stable label used as a rejection counter key.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::Channel { .. } => "malformed_channel",
            ValidationError::UnknownChannel(_) => "unknown_channel",
            ValidationError::Malformed(_) => "malformed_message",
            ValidationError::NotAnObject => "not_an_object",
            ValidationError::MissingField(_) => "missing_field",
            ValidationError::NonNumericValue => "non_numeric_value",
            ValidationError::NonFiniteValue => "non_finite_value",
            ValidationError::BadTimestamp(_) => "bad_timestamp",
            ValidationError::ClockSkew { .. } => "clock_skew",
            ValidationError::BadSequence => "bad_sequence",
        }
    }
}

/// Parse a channel name into its typed key.
pub fn parse_channel(channel: &str) -> Result<ChannelKey, ValidationError> {
    channel.parse().map_err(|source| ValidationError::Channel {
        channel: channel.to_string(),
        source,
    })
}

/// Accepts RFC 3339 strings or epoch seconds (integer or fractional).
pub fn parse_timestamp(raw: &Value) -> Result<DateTime<Utc>, ValidationError> {
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| ValidationError::BadTimestamp(format!("'{s}': {e}"))),
        Value::Number(n) => {
            let parsed = if let Some(secs) = n.as_i64() {
                DateTime::from_timestamp(secs, 0)
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .and_then(|f| DateTime::from_timestamp_micros((f * 1e6).round() as i64))
            };
            parsed.ok_or_else(|| ValidationError::BadTimestamp(format!("epoch {n} out of range")))
        }
        other => Err(ValidationError::BadTimestamp(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Parsed payload fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayloadFields {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

/// Validate the payload against pipeline time `now`.
pub fn parse_payload(
    payload: &Value,
    now: DateTime<Utc>,
    max_skew_secs: u64,
) -> Result<PayloadFields, ValidationError> {
    let obj = payload.as_object().ok_or(ValidationError::NotAnObject)?;
    let field = |name: &'static str| obj.get(name).ok_or(ValidationError::MissingField(name));

    let value = field("value")?
        .as_f64()
        .ok_or(ValidationError::NonNumericValue)?;
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue);
    }

    let timestamp = parse_timestamp(field("timestamp")?)?;
    let skew_ms = (timestamp - now).num_milliseconds().abs();
    if skew_ms > (max_skew_secs as i64).saturating_mul(1000) {
        return Err(ValidationError::ClockSkew {
            timestamp,
            skew_secs: skew_ms / 1000,
            max_secs: max_skew_secs,
        });
    }

    let sequence = field("sequence")?
        .as_u64()
        .ok_or(ValidationError::BadSequence)?;

    Ok(PayloadFields {
        value,
        timestamp,
        sequence,
    })
}

/// Turns envelopes into readings for one plant.
#[derive(Clone)]
pub struct MessageValidator {
    registry: Arc<TopologyRegistry>,
    max_skew_secs: u64,
}

impl MessageValidator {
    pub fn new(registry: Arc<TopologyRegistry>, max_skew_secs: u64) -> Self {
        Self {
            registry,
            max_skew_secs,
        }
    }

    pub fn validate(&self, envelope: &Envelope, now: DateTime<Utc>) -> Result<Reading, ValidationError> {
        let key = parse_channel(&envelope.channel)?;
        if !self.registry.contains(&key) {
            return Err(ValidationError::UnknownChannel(envelope.channel.clone()));
        }
        let fields = parse_payload(&envelope.payload, now, self.max_skew_secs)?;
        Ok(Reading::new(key, fields.value, fields.timestamp, fields.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    #[test]
    fn accepts_minimal_payload_and_ignores_extras() {
        let p = json!({
            "value": 3.5,
            "timestamp": "2026-05-04T10:00:01Z",
            "sequence": 12,
            "unit": "mm/s",
            "anything": [1, 2, 3]
        });
        let f = parse_payload(&p, now(), 300).unwrap();
        assert_eq!(f.value, 3.5);
        assert_eq!(f.sequence, 12);
    }

    #[test]
    fn epoch_seconds_timestamps() {
        let secs = now().timestamp();
        assert_eq!(parse_timestamp(&json!(secs)).unwrap(), now());
        let frac = parse_timestamp(&json!(secs as f64 + 0.25)).unwrap();
        assert_eq!(frac.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn field_errors() {
        let cases = [
            (json!([1, 2]), "not_an_object"),
            (json!({ "timestamp": "2026-05-04T10:00:00Z", "sequence": 1 }), "missing_field"),
            (json!({ "value": "hot", "timestamp": "2026-05-04T10:00:00Z", "sequence": 1 }), "non_numeric_value"),
            (json!({ "value": 1.0, "timestamp": "yesterday", "sequence": 1 }), "bad_timestamp"),
            (json!({ "value": 1.0, "timestamp": true, "sequence": 1 }), "bad_timestamp"),
            (json!({ "value": 1.0, "timestamp": "2026-05-04T10:00:00Z", "sequence": -1 }), "bad_sequence"),
            (json!({ "value": 1.0, "timestamp": "2026-05-04T10:00:00Z", "sequence": 1.5 }), "bad_sequence"),
            (json!({ "value": 1.0, "timestamp": "2026-05-04T10:00:00Z" }), "missing_field"),
        ];
        for (payload, reason) in cases {
            let err = parse_payload(&payload, now(), 300).unwrap_err();
            assert_eq!(err.reason(), reason, "payload {payload}");
        }
    }

    #[test]
    fn clock_skew_window() {
        let within = json!({ "value": 1.0, "timestamp": "2026-05-04T10:05:00Z", "sequence": 1 });
        assert!(parse_payload(&within, now(), 300).is_ok());

        let past = json!({ "value": 1.0, "timestamp": "2026-05-04T09:54:59Z", "sequence": 1 });
        match parse_payload(&past, now(), 300) {
            Err(ValidationError::ClockSkew { skew_secs, .. }) => assert_eq!(skew_secs, 301),
            other => panic!("expected skew error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_channels() {
        for bad in [
            "sector_1/line_1/asset_3",
            "sector_1/line_1/asset_3/temp/extra",
            "sector_1/line_1/asset 3/temp",
            "sector_x/line_1/asset_3/temp",
            "",
        ] {
            let err = parse_channel(bad).unwrap_err();
            assert_eq!(err.reason(), "malformed_channel", "channel {bad:?}");
        }
        assert!(parse_channel("sector_1/line_1/asset_3/temperature").is_ok());
    }
}
