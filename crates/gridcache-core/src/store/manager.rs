use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use super::backend::StoreBackend;
use super::entry::{CacheEntry, Partition};
use super::file::FileBackend;
use super::memory::MemoryBackend;

/// Persistent key-value store with TTL expiry and a fallback backend.
///
/// Operations never fail towards the caller: reads degrade to `None`, writes
/// report `false`. Every operation waits for [`Store::init`] to finish, so
/// callers racing the first initialisation are queued rather than lost.
pub struct Store {
    primary: Arc<dyn StoreBackend>,
    fallback: Arc<dyn StoreBackend>,
    fallback_active: AtomicBool,
    ready: OnceCell<()>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub backend: &'static str,
    pub fallback_active: bool,
    pub partitions: Vec<PartitionStats>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStats {
    pub partition: Partition,
    pub entries: usize,
    /// Age of the most recent write, e.g. "5m ago".
    pub last_write: Option<String>,
}

impl StoreStats {
    pub fn entries_in(&self, partition: Partition) -> usize {
        self.partitions
            .iter()
            .find(|p| p.partition == partition)
            .map(|p| p.entries)
            .unwrap_or(0)
    }
}

impl Store {
    pub fn new(primary: Arc<dyn StoreBackend>, fallback: Arc<dyn StoreBackend>) -> Self {
        Self {
            primary,
            fallback,
            fallback_active: AtomicBool::new(false),
            ready: OnceCell::new(),
        }
    }

    /// File-backed store rooted at `dir`, falling back to memory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(
            Arc::new(FileBackend::new(dir)),
            Arc::new(MemoryBackend::new()),
        )
    }

    /// Opens the primary backend. A failure switches the store to its
    /// fallback; either way the store is usable once this returns.
    pub async fn init(&self) {
        self.ready
            .get_or_init(|| async {
                if let Err(e) = self.fallback.open().await {
                    error!(backend = self.fallback.name(), error = %e, "Fallback backend failed to open");
                }
                match self.primary.open().await {
                    Ok(()) => {
                        info!(backend = self.primary.name(), "Store ready");
                    }
                    Err(e) => {
                        warn!(
                            backend = self.primary.name(),
                            fallback = self.fallback.name(),
                            error = %e,
                            "Primary store unavailable, using fallback"
                        );
                        self.fallback_active.store(true, Ordering::SeqCst);
                    }
                }
            })
            .await;
    }

    pub fn is_fallback_active(&self) -> bool {
        self.fallback_active.load(Ordering::SeqCst)
    }

    fn active(&self) -> &Arc<dyn StoreBackend> {
        if self.is_fallback_active() {
            &self.fallback
        } else {
            &self.primary
        }
    }

    /// Backends in sweep order, skipping the primary once it is out of service.
    fn backends(&self) -> Vec<&Arc<dyn StoreBackend>> {
        if self.is_fallback_active() {
            vec![&self.fallback]
        } else {
            vec![&self.primary, &self.fallback]
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_in(Partition::Cache, key).await
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Duration) -> bool {
        self.set_in(Partition::Cache, key, value, ttl).await
    }

    /// Returns the live value for `key`, evicting it if it has expired.
    ///
    /// Both backends are consulted and the most recent write wins, so a write
    /// that degraded to the fallback is never shadowed by an older primary
    /// copy. Superseded copies are dropped on the way.
    pub async fn get_in(&self, partition: Partition, key: &str) -> Option<Value> {
        self.init().await;

        let mut newest: Option<(&Arc<dyn StoreBackend>, CacheEntry)> = None;
        for backend in self.backends() {
            let Some(entry) = self.load_from(backend, partition, key).await else {
                continue;
            };
            // Ties go to the later backend: a fallback write only happens
            // after the primary refused the same key.
            match newest.take() {
                Some((held_by, held)) if held.stored_at > entry.stored_at => {
                    self.evict(backend, partition, key, "superseded").await;
                    newest = Some((held_by, held));
                }
                Some((held_by, _)) => {
                    self.evict(held_by, partition, key, "superseded").await;
                    newest = Some((backend, entry));
                }
                None => newest = Some((backend, entry)),
            }
        }

        let (backend, entry) = newest?;
        if entry.is_expired() {
            self.evict(backend, partition, key, "expired").await;
            return None;
        }
        Some(entry.value)
    }

    /// Writes `value` with the given TTL. Returns `false` only if neither
    /// backend accepted the write.
    pub async fn set_in(&self, partition: Partition, key: &str, value: Value, ttl: Duration) -> bool {
        self.init().await;

        let Some(entry) = CacheEntry::new(key, value, ttl, Utc::now()) else {
            warn!(%partition, key, ?ttl, "Refusing to store entry with empty TTL");
            return false;
        };

        if !self.is_fallback_active() {
            match self.primary.save(partition, &entry).await {
                Ok(()) => {
                    debug!(%partition, key, "Stored entry");
                    // An earlier degraded write must not resurface once this
                    // entry expires.
                    if let Err(e) = self.fallback.remove(partition, key).await {
                        warn!(backend = self.fallback.name(), %partition, key, error = %e, "Could not drop superseded fallback entry");
                    }
                    return true;
                }
                Err(e) => {
                    warn!(%partition, key, error = %e, "Primary write failed, degrading to fallback");
                    // Reads pick the newest copy, so a primary copy that
                    // cannot be removed is still outranked by this write.
                    if let Err(e) = self.primary.remove(partition, key).await {
                        warn!(%partition, key, error = %e, "Could not drop stale primary entry");
                    }
                }
            }
        }

        match self.fallback.save(partition, &entry).await {
            Ok(()) => true,
            Err(e) => {
                error!(%partition, key, error = %e, "Fallback write failed");
                false
            }
        }
    }

    /// Removes `key` from every backend. Returns whether anything was removed.
    pub async fn remove_in(&self, partition: Partition, key: &str) -> bool {
        self.init().await;

        let mut removed = false;
        for backend in self.backends() {
            match backend.remove(partition, key).await {
                Ok(hit) => removed |= hit,
                Err(e) => {
                    warn!(backend = backend.name(), %partition, key, error = %e, "Remove failed");
                }
            }
        }
        removed
    }

    pub async fn get_as<T: DeserializeOwned>(&self, partition: Partition, key: &str) -> Option<T> {
        let value = self.get_in(partition, key).await?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(%partition, key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    pub async fn set_as<T: Serialize>(&self, partition: Partition, key: &str, data: &T, ttl: Duration) -> bool {
        match serde_json::to_value(data) {
            Ok(value) => self.set_in(partition, key, value, ttl).await,
            Err(e) => {
                warn!(%partition, key, error = %e, "Failed to serialize value for store");
                false
            }
        }
    }

    /// Sweeps every partition and removes expired entries. Returns how many
    /// were removed; failures are logged and skipped.
    pub async fn clear_expired(&self) -> usize {
        self.init().await;

        let now = Utc::now();
        let mut removed = 0;
        for backend in self.backends() {
            for partition in Partition::ALL {
                let entries = match backend.entries(partition).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(backend = backend.name(), %partition, error = %e, "Expiry sweep failed");
                        continue;
                    }
                };
                for entry in entries.iter().filter(|e| e.is_expired_at(now)) {
                    match backend.remove(partition, &entry.key).await {
                        Ok(true) => removed += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(backend = backend.name(), %partition, key = %entry.key, error = %e, "Failed to evict expired entry");
                        }
                    }
                }
            }
        }

        if removed > 0 {
            info!(removed, "Cleared expired cache entries");
        }
        removed
    }

    /// Wipes every partition on both backends.
    pub async fn clear_all(&self) {
        self.init().await;

        for backend in self.backends() {
            for partition in Partition::ALL {
                if let Err(e) = backend.clear(partition).await {
                    warn!(backend = backend.name(), %partition, error = %e, "Failed to clear partition");
                }
            }
        }
        info!("Store cleared");
    }

    pub async fn stats(&self) -> StoreStats {
        self.init().await;

        let backend = self.active();
        let mut partitions = Vec::with_capacity(Partition::ALL.len());
        for partition in Partition::ALL {
            let list = match backend.entries(partition).await {
                Ok(list) => list,
                Err(e) => {
                    debug!(%partition, error = %e, "Failed to count entries");
                    Vec::new()
                }
            };
            partitions.push(PartitionStats {
                partition,
                entries: list.len(),
                last_write: list
                    .iter()
                    .max_by_key(|entry| entry.stored_at)
                    .map(CacheEntry::age_display),
            });
        }

        StoreStats {
            backend: backend.name(),
            fallback_active: self.is_fallback_active(),
            partitions,
        }
    }

    async fn load_from(&self, backend: &Arc<dyn StoreBackend>, partition: Partition, key: &str) -> Option<CacheEntry> {
        match backend.load(partition, key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(backend = backend.name(), %partition, key, error = %e, "Read failed");
                None
            }
        }
    }

    async fn evict(&self, backend: &Arc<dyn StoreBackend>, partition: Partition, key: &str, reason: &str) {
        debug!(backend = backend.name(), %partition, key, reason, "Evicting entry");
        if let Err(e) = backend.remove(partition, key).await {
            warn!(backend = backend.name(), %partition, key, error = %e, "Failed to evict entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreError, StoreResult};
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    /// Memory backend whose writes and removals can be switched to fail.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_saves: AtomicBool,
        fail_removes: AtomicBool,
    }

    impl FlakyBackend {
        fn set_failing(&self, saves: bool, removes: bool) {
            self.fail_saves.store(saves, Ordering::SeqCst);
            self.fail_removes.store(removes, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StoreBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn open(&self) -> StoreResult<()> {
            Ok(())
        }

        async fn load(&self, partition: Partition, key: &str) -> StoreResult<Option<CacheEntry>> {
            self.inner.load(partition, key).await
        }

        async fn save(&self, partition: Partition, entry: &CacheEntry) -> StoreResult<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.save(partition, entry).await
        }

        async fn remove(&self, partition: Partition, key: &str) -> StoreResult<bool> {
            if self.fail_removes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("read-only".to_string()));
            }
            self.inner.remove(partition, key).await
        }

        async fn entries(&self, partition: Partition) -> StoreResult<Vec<CacheEntry>> {
            self.inner.entries(partition).await
        }

        async fn clear(&self, partition: Partition) -> StoreResult<()> {
            self.inner.clear(partition).await
        }
    }

    fn create_flaky_store() -> (Store, Arc<FlakyBackend>, Arc<MemoryBackend>) {
        let primary = Arc::new(FlakyBackend::default());
        let fallback = Arc::new(MemoryBackend::new());
        let store = Store::new(primary.clone(), fallback.clone());
        (store, primary, fallback)
    }

    fn create_test_store() -> (Store, Arc<FileBackend>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let primary = Arc::new(FileBackend::new(temp_dir.path().join("store")));
        let store = Store::new(primary.clone(), Arc::new(MemoryBackend::new()));
        (store, primary, temp_dir)
    }

    fn expired_entry(key: &str) -> CacheEntry {
        let mut entry = CacheEntry::new(key, json!({"stale": true}), HOUR, Utc::now())
            .expect("entry");
        entry.stored_at = Utc::now() - chrono::Duration::hours(2);
        entry.expires_at = Utc::now() - chrono::Duration::hours(1);
        entry
    }

    #[tokio::test]
    async fn test_roundtrip_returns_written_value() {
        let (store, _primary, _temp_dir) = create_test_store();
        let value = json!({"id": 7, "fullName": "Test Player", "stats": [1, 2, 3]});

        assert!(store.set("https://api.example/athletes/7", value.clone(), HOUR).await);
        assert_eq!(store.get("https://api.example/athletes/7").await, Some(value));
        assert!(!store.is_fallback_active());
    }

    #[tokio::test]
    async fn test_get_missing_key_returns_none() {
        let (store, _primary, _temp_dir) = create_test_store();
        assert_eq!(store.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted_on_read() {
        let (store, primary, _temp_dir) = create_test_store();
        store.init().await;
        primary.save(Partition::Cache, &expired_entry("old")).await.expect("plant entry");

        assert_eq!(store.get("old").await, None);
        assert!(primary.load(Partition::Cache, "old").await.expect("load").is_none());
        // Second read is a clean miss
        assert_eq!(store.get("old").await, None);
    }

    #[tokio::test]
    async fn test_zero_ttl_write_is_rejected() {
        let (store, _primary, _temp_dir) = create_test_store();
        assert!(!store.set("k", json!(1), Duration::ZERO).await);
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_primary_write_failure_degrades_to_fallback() {
        let (store, primary, _temp_dir) = create_test_store();
        store.init().await;
        assert!(store.set_in(Partition::Teams, "roster_3", json!({"v": 1}), HOUR).await);

        // Pull the partition directory out from under the primary backend.
        std::fs::remove_dir_all(primary.root().join("teams")).expect("remove dir");

        assert!(store.set_in(Partition::Teams, "roster_3", json!({"v": 2}), HOUR).await);
        assert_eq!(store.get_in(Partition::Teams, "roster_3").await, Some(json!({"v": 2})));
    }

    #[tokio::test]
    async fn test_degraded_write_outranks_undeletable_primary_copy() {
        let (store, primary, _fallback) = create_flaky_store();
        assert!(store.set("k", json!({"v": 1}), HOUR).await);

        primary.set_failing(true, true);
        assert!(store.set("k", json!({"v": 2}), HOUR).await);

        assert_eq!(store.get("k").await, Some(json!({"v": 2})));
        assert!(!store.is_fallback_active());

        // Once the primary recovers, the stale copy is dropped on read.
        primary.set_failing(false, false);
        assert_eq!(store.get("k").await, Some(json!({"v": 2})));
        assert!(primary.load(Partition::Cache, "k").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_recovered_write_replaces_fallback_copy() {
        let (store, primary, fallback) = create_flaky_store();

        primary.set_failing(true, false);
        assert!(store.set("k", json!({"v": 1}), HOUR).await);
        assert!(fallback.load(Partition::Cache, "k").await.expect("load").is_some());

        primary.set_failing(false, false);
        assert!(store.set("k", json!({"v": 2}), Duration::from_millis(50)).await);
        assert!(fallback.load(Partition::Cache, "k").await.expect("load").is_none());
        assert_eq!(store.get("k").await, Some(json!({"v": 2})));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_expired_newest_copy_hides_older_ones() {
        let (store, primary, fallback) = create_flaky_store();
        store.init().await;

        let older = CacheEntry::new("k", json!({"v": 1}), HOUR, Utc::now() - chrono::Duration::minutes(10))
            .expect("entry");
        let mut newer = CacheEntry::new("k", json!({"v": 2}), HOUR, Utc::now()).expect("entry");
        newer.expires_at = newer.stored_at - chrono::Duration::seconds(1);
        fallback.save(Partition::Cache, &older).await.expect("plant fallback");
        primary.save(Partition::Cache, &newer).await.expect("plant primary");

        assert_eq!(store.get("k").await, None);
        assert!(fallback.load(Partition::Cache, "k").await.expect("load").is_none());
        assert!(primary.load(Partition::Cache, "k").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_clear_expired_sweeps_all_partitions() {
        let (store, primary, _temp_dir) = create_test_store();
        store.init().await;

        primary.save(Partition::Cache, &expired_entry("a")).await.expect("plant");
        primary.save(Partition::Players, &expired_entry("player_fantasy_stats_1")).await.expect("plant");
        assert!(store.set_in(Partition::Players, "fresh", json!(1), HOUR).await);

        assert_eq!(store.clear_expired().await, 2);
        assert_eq!(store.get_in(Partition::Players, "fresh").await, Some(json!(1)));
        assert_eq!(store.clear_expired().await, 0);
    }

    #[tokio::test]
    async fn test_clear_all_wipes_every_partition() {
        let (store, _primary, _temp_dir) = create_test_store();
        for partition in Partition::ALL {
            assert!(store.set_in(partition, "k", json!(partition.as_str()), HOUR).await);
        }

        store.clear_all().await;

        for partition in Partition::ALL {
            assert_eq!(store.get_in(partition, "k").await, None);
        }
        let stats = store.stats().await;
        assert!(stats.partitions.iter().all(|p| p.entries == 0 && p.last_write.is_none()));
    }

    #[tokio::test]
    async fn test_typed_access() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Lineup {
            slots: Vec<String>,
        }

        let (store, _primary, _temp_dir) = create_test_store();
        let lineup = Lineup {
            slots: vec!["QB".to_string(), "RB".to_string()],
        };

        assert!(store.set_as(Partition::Lineups, "current_lineup", &lineup, HOUR).await);
        assert_eq!(store.get_as::<Lineup>(Partition::Lineups, "current_lineup").await, Some(lineup));
        assert_eq!(store.get_as::<Vec<u32>>(Partition::Lineups, "current_lineup").await, None);
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_share_one_init() {
        let (store, _primary, _temp_dir) = create_test_store();
        let store = Arc::new(store);

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.set(&format!("key_{}", i), json!(i), HOUR).await
                })
            })
            .collect();

        for writer in writers {
            assert!(writer.await.expect("task should not panic"));
        }
        for i in 0..8 {
            assert_eq!(store.get(&format!("key_{}", i)).await, Some(json!(i)));
        }
    }

    #[tokio::test]
    async fn test_stats_reports_counts() {
        let (store, _primary, _temp_dir) = create_test_store();
        assert!(store.set("a", json!(1), HOUR).await);
        assert!(store.set("b", json!(2), HOUR).await);
        assert!(store.set_in(Partition::Players, "p", json!(3), HOUR).await);

        let stats = store.stats().await;
        assert_eq!(stats.backend, "file");
        assert!(!stats.fallback_active);
        assert_eq!(stats.entries_in(Partition::Cache), 2);
        assert_eq!(stats.entries_in(Partition::Players), 1);
        assert_eq!(stats.entries_in(Partition::Lineups), 0);
        let cache = stats
            .partitions
            .iter()
            .find(|p| p.partition == Partition::Cache)
            .expect("cache partition listed");
        assert_eq!(cache.last_write.as_deref(), Some("just now"));
    }
}
