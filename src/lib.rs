//! twinpulse: digital-twin telemetry for industrial plants
//!
//! Simulates sensor readings for every asset in a sector → line → asset
//! hierarchy, publishes them as channel-addressed JSON messages, and runs
//! the consuming side: validation, storage and hysteresis alarms.
//!
//! ## Architecture
//!
//! - **Topology Registry**: immutable plant model and sensor templates
//! - **Digital Twin**: seeded per-asset signal generator with fault injection
//! - **Publisher**: envelope encoding, bounded retry, tick deadline
//! - **Pipeline**: channel/payload validation, routing to storage and alarms
//! - **Alarm Engine**: per-channel severity state machine with hysteresis

pub mod alarm;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod publisher;
pub mod storage;
pub mod topology;
pub mod twin;
pub mod types;

pub use alarm::{AlarmEngine, NotificationDispatcher};
pub use config::{ConfigError, PlantConfig};
pub use pipeline::{ProcessingLoop, ValidationPipeline};
pub use publisher::{Envelope, TelemetryPublisher, Transport};
pub use storage::StorageSink;
pub use topology::TopologyRegistry;
pub use twin::{FaultMode, TwinGenerator};
pub use types::{AlarmEvent, AssetId, ChannelKey, Reading, Severity};
