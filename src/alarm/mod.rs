//! Alarm evaluation and notification.

pub mod dispatcher;
mod engine;

pub use dispatcher::{DispatchError, LogDispatcher, NotificationDispatcher, WebhookDispatcher};
pub use engine::{next_severity, AlarmEngine, AlarmStats, AlarmStatus, Evaluation};
