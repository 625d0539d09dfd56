//! Shared data structures for the telemetry pipeline
//!
//! - `ChannelKey` / `AssetId`: typed plant addresses
//! - `Reading`: one sensor sample from the digital twin
//! - `Severity`, `AlarmEvent`: alarm engine outputs

mod alarm;
mod channel;
mod reading;

pub use alarm::*;
pub use channel::*;
pub use reading::*;
