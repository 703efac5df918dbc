use async_trait::async_trait;
use thiserror::Error;

use super::entry::{CacheEntry, Partition};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode entry: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A place entries can live. Each call is atomic for a single key; there are
/// no cross-key transactions.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Prepares the backend for use. Called once by the store before any
    /// other operation.
    async fn open(&self) -> StoreResult<()>;

    async fn load(&self, partition: Partition, key: &str) -> StoreResult<Option<CacheEntry>>;

    async fn save(&self, partition: Partition, entry: &CacheEntry) -> StoreResult<()>;

    /// Returns whether an entry was removed.
    async fn remove(&self, partition: Partition, key: &str) -> StoreResult<bool>;

    /// Every entry currently held in a partition, expired or not.
    async fn entries(&self, partition: Partition) -> StoreResult<Vec<CacheEntry>>;

    async fn clear(&self, partition: Partition) -> StoreResult<()>;
}
