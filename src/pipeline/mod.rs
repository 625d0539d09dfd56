//! Validation & Routing Pipeline
//!
//! ```text
//! MessageSource ─▶ ProcessingLoop ─▶ ValidationPipeline ─▶ StorageSink
//!                                                      └─▶ AlarmEngine ─▶ NotificationDispatcher
//! ```
//!
//! The loop runs as one task that exclusively owns the alarm engine, so
//! per-channel state needs no locks.

mod router;
pub mod processing_loop;
pub mod source;
pub mod validation;

pub use processing_loop::ProcessingLoop;
pub use router::{PipelineStats, Routed, ValidationPipeline};
pub use source::{BusSource, LineSource, MessageEvent, MessageSource, StdinSource};
pub use validation::{MessageValidator, ValidationError};
