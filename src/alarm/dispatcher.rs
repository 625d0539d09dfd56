//! Notification dispatch
//!
//! The alarm engine hands every severity transition to exactly one
//! [`NotificationDispatcher`]. Dispatch is fire-once: a failure is reported
//! back to the engine, which logs and counts it but never retries.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{NotifierConfig, NotifierKind};
use crate::types::{AlarmEvent, Severity};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Dispatcher unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, event: &AlarmEvent) -> Result<(), DispatchError>;

    fn name(&self) -> &str;
}

/// Build the dispatcher selected by configuration.
pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn NotificationDispatcher>, DispatchError> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogDispatcher)),
        NotifierKind::Webhook => Ok(Arc::new(WebhookDispatcher::new(
            &config.webhook_url,
            Duration::from_millis(config.timeout_ms),
        )?)),
    }
}

// ============================================================================
// Log
// ============================================================================

/// Writes each alarm as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify(&self, event: &AlarmEvent) -> Result<(), DispatchError> {
        let channel = event.key.to_channel();
        match event.severity {
            Severity::Critical => error!(
                channel = %channel,
                severity = %event.severity,
                previous = %event.previous,
                value = event.value,
                sequence = event.sequence,
                "🚨 {}",
                event.summary()
            ),
            Severity::Warning => warn!(
                channel = %channel,
                severity = %event.severity,
                previous = %event.previous,
                value = event.value,
                sequence = event.sequence,
                "⚠️  {}",
                event.summary()
            ),
            Severity::Normal => info!(
                channel = %channel,
                severity = %event.severity,
                previous = %event.previous,
                value = event.value,
                sequence = event.sequence,
                "✅ {}",
                event.summary()
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

// ============================================================================
// Webhook
// ============================================================================

/// POSTs each alarm as JSON to a fixed URL.
#[derive(Clone)]
pub struct WebhookDispatcher {
    http: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn notify(&self, event: &AlarmEvent) -> Result<(), DispatchError> {
        let resp = self.http.post(&self.url).json(event).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(DispatchError::Status(resp.status()))
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
