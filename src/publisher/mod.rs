//! Telemetry Publisher
//!
//! Turns generator readings into channel-addressed JSON envelopes and pushes
//! them through a [`Transport`] with bounded retry.

mod payload;
mod telemetry;
mod transport;

pub use payload::encode;
pub use telemetry::{
    backoff_delay, BatchReport, BatchSender, PublisherSnapshot, PublisherStats, TelemetryPublisher,
};
pub use transport::{Envelope, InMemoryBus, LineTransport, Transport, TransportError};
