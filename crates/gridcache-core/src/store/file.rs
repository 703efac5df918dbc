//! Primary backend: one pretty-printed JSON file per entry.
//!
//! Layout is `<root>/<partition>/<sha256(key)>.json`. Keys are usually full
//! request URLs, so the file name is a digest; the original key is kept
//! inside the entry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use super::backend::{StoreBackend, StoreResult};
use super::entry::{CacheEntry, Partition};

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.root.join(partition.as_str())
    }

    fn entry_path(&self, partition: Partition, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.partition_dir(partition)
            .join(format!("{}.{}", digest, ENTRY_EXTENSION))
    }

    async fn read_entry(path: &Path) -> StoreResult<Option<CacheEntry>> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StoreBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn open(&self) -> StoreResult<()> {
        for partition in Partition::ALL {
            fs::create_dir_all(self.partition_dir(partition)).await?;
        }
        Ok(())
    }

    async fn load(&self, partition: Partition, key: &str) -> StoreResult<Option<CacheEntry>> {
        let entry = Self::read_entry(&self.entry_path(partition, key)).await?;
        // Digest collisions are not expected, but never serve another key's value.
        Ok(entry.filter(|e| e.key == key))
    }

    async fn save(&self, partition: Partition, entry: &CacheEntry) -> StoreResult<()> {
        let path = self.entry_path(partition, &entry.key);
        let contents = serde_json::to_string_pretty(entry)?;

        // Write then rename so readers never see a half-written file.
        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.tmp{}", ENTRY_EXTENSION, seq));
        fs::write(&tmp, contents).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, partition: Partition, key: &str) -> StoreResult<bool> {
        match fs::remove_file(self.entry_path(partition, key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn entries(&self, partition: Partition) -> StoreResult<Vec<CacheEntry>> {
        let mut dir = match fs::read_dir(self.partition_dir(partition)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable cache file");
                }
            }
        }
        Ok(entries)
    }

    async fn clear(&self, partition: Partition) -> StoreResult<()> {
        let dir = self.partition_dir(partition);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&dir).await?;
        Ok(())
    }
}
