//! Telemetry payload encoding
//!
//! ```json
//! {
//!   "value": 4.512,
//!   "timestamp": "2026-01-01T00:00:00Z",
//!   "sequence": 42,
//!   "unit": "mm/s",
//!   "metadata": { "warning_threshold": 4.5, "critical_threshold": 7.1 }
//! }
//! ```
//!
//! Consumers need only `value`, `timestamp` and `sequence`; the rest is
//! informational.

use chrono::SecondsFormat;
use serde::Serialize;

use super::transport::{Envelope, TransportError};
use crate::topology::SensorTemplate;
use crate::types::Reading;

#[derive(Debug, Serialize)]
struct TelemetryPayload<'a> {
    value: f64,
    timestamp: String,
    sequence: u64,
    unit: &'a str,
    metadata: PayloadMetadata,
}

#[derive(Debug, Serialize)]
struct PayloadMetadata {
    warning_threshold: f64,
    critical_threshold: f64,
}

/// Build the wire envelope for one reading.
///
/// Timestamps keep sub-second digits only when present, so parsing the
/// payload back yields the identical instant.
pub fn encode(reading: &Reading, template: &SensorTemplate) -> Result<Envelope, TransportError> {
    let payload = TelemetryPayload {
        value: reading.value,
        timestamp: reading.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        sequence: reading.sequence,
        unit: &template.unit,
        metadata: PayloadMetadata {
            warning_threshold: template.warning,
            critical_threshold: template.critical,
        },
    };
    Ok(Envelope::new(reading.key.to_channel(), serde_json::to_value(payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlantConfig;
    use crate::topology::TopologyRegistry;
    use crate::types::ChannelKey;
    use chrono::{TimeZone, Utc};

    #[test]
    fn envelope_shape() {
        let registry = TopologyRegistry::load(&PlantConfig::default()).unwrap();
        let template = registry.resolve_template("vibration").unwrap();
        let reading = Reading::new(
            ChannelKey::new("sector_1", "line_2", "asset_3", "vibration"),
            1.25,
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            7,
        );

        let env = encode(&reading, template).unwrap();
        assert_eq!(env.channel, "sector_1/line_2/asset_3/vibration");
        assert_eq!(env.payload["value"], 1.25);
        assert_eq!(env.payload["timestamp"], "2026-03-01T12:00:00Z");
        assert_eq!(env.payload["sequence"], 7);
        assert_eq!(env.payload["unit"], "mm/s");
        assert_eq!(env.payload["metadata"]["critical_threshold"], 7.1);
    }
}
