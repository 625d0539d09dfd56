//! Reading Storage
//!
//! Every validated reading is written to a [`StorageSink`] before alarm
//! evaluation. Storage is best-effort: the pipeline logs and counts a
//! failed write, then carries on.
//!
//! The default sink is an embedded sled tree keyed by
//! `<channel> 0x00 <sequence as u64 big-endian>`, so a prefix scan returns one
//! channel's readings in sequence order.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageConfig, StorageKind};
use crate::types::{ChannelKey, Reading};

/// Separates the channel name from the sequence in a key.
const KEY_SEPARATOR: u8 = 0;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Destination for validated readings.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn write(&self, reading: &Reading) -> Result<(), StorageError>;

    fn name(&self) -> &str;
}

/// Build the sink selected by configuration.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn StorageSink>, StorageError> {
    match config.kind {
        StorageKind::Sled => Ok(Arc::new(SledStore::open(&config.path)?)),
        StorageKind::None => Ok(Arc::new(NullSink)),
    }
}

// ============================================================================
// Sled
// ============================================================================

#[derive(Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
}

impl SledStore {
    /// Open or create the reading store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        tracing::info!(path = %path.display(), "Reading storage opened");
        Ok(Self { db: Arc::new(db) })
    }

    fn prefix(key: &ChannelKey) -> Vec<u8> {
        let mut prefix = key.to_channel().into_bytes();
        prefix.push(KEY_SEPARATOR);
        prefix
    }

    fn row_key(reading: &Reading) -> Vec<u8> {
        let mut key = Self::prefix(&reading.key);
        key.extend_from_slice(&reading.sequence.to_be_bytes());
        key
    }

    /// Most recent `limit` readings for a channel, newest first.
    ///
    /// Rows that fail to decode are skipped.
    pub fn recent(&self, key: &ChannelKey, limit: usize) -> Vec<Reading> {
        self.db
            .scan_prefix(Self::prefix(key))
            .rev()
            .filter_map(|item| item.ok())
            .filter_map(|(_, value)| serde_json::from_slice::<Reading>(&value).ok())
            .take(limit)
            .collect()
    }

    /// Total number of stored readings.
    pub fn count(&self) -> usize {
        self.db.len()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl StorageSink for SledStore {
    /// No per-write flush; sled flushes in the background and a crash loses
    /// at most the last few readings.
    async fn write(&self, reading: &Reading) -> Result<(), StorageError> {
        let value = serde_json::to_vec(reading)?;
        self.db.insert(Self::row_key(reading), value)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "sled"
    }
}

// ============================================================================
// Null
// ============================================================================

/// Discards everything (storage disabled).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl StorageSink for NullSink {
    async fn write(&self, _reading: &Reading) -> Result<(), StorageError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}
