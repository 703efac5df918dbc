//! In-process fallback backend. Always available, lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{StoreBackend, StoreResult};
use super::entry::{CacheEntry, Partition};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    partitions: RwLock<HashMap<Partition, HashMap<String, CacheEntry>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn load(&self, partition: Partition, key: &str) -> StoreResult<Option<CacheEntry>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(&partition)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn save(&self, partition: Partition, entry: &CacheEntry) -> StoreResult<()> {
        let mut partitions = self.partitions.write().await;
        partitions
            .entry(partition)
            .or_default()
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn remove(&self, partition: Partition, key: &str) -> StoreResult<bool> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions
            .get_mut(&partition)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn entries(&self, partition: Partition) -> StoreResult<Vec<CacheEntry>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(&partition)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, partition: Partition) -> StoreResult<()> {
        self.partitions.write().await.remove(&partition);
        Ok(())
    }
}
