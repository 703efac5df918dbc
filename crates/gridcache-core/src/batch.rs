//! Many fetches or cache writes at once, tolerating partial failure.
//!
//! Every item resolves to its own result; one failure never cancels the
//! others and the batch call itself never fails. Chunked variants wait a
//! fixed delay between chunks so a large batch stays inside the throttle
//! window.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::api::{CachedClient, ErrorKind, FetchError};
use crate::config::BatchConfig;
use crate::store::{Partition, Store};

/// Outcome of one fetch within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
}

impl FetchResult {
    fn from_outcome(url: &str, outcome: Result<Value, FetchError>) -> Self {
        match outcome {
            Ok(data) => Self {
                url: url.to_string(),
                success: true,
                data: Some(data),
                error: None,
                message: None,
            },
            Err(e) => Self {
                url: url.to_string(),
                success: false,
                data: None,
                error: Some(e.kind()),
                message: Some(e.to_string()),
            },
        }
    }
}

/// A single write for [`BatchCoordinator::batch_cache_operation`].
#[derive(Debug, Clone)]
pub struct CacheOp {
    pub partition: Partition,
    pub key: String,
    pub value: Value,
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpResult {
    pub key: String,
    pub success: bool,
}

#[derive(Clone)]
pub struct BatchCoordinator {
    client: CachedClient,
    config: BatchConfig,
}

impl BatchCoordinator {
    pub fn new(client: CachedClient, config: BatchConfig) -> Self {
        Self { client, config }
    }

    fn store(&self) -> &Store {
        self.client.store()
    }

    /// Fetches every URL concurrently. Results keep the input order.
    pub async fn batch_fetch<S: AsRef<str>>(&self, urls: &[S]) -> Vec<FetchResult> {
        let results = join_all(urls.iter().map(|url| self.fetch_one(url.as_ref()))).await;
        log_summary("fetch", results.iter().filter(|r| r.success).count(), results.len());
        results
    }

    /// Fetches in chunks of the configured size, pausing between chunks.
    pub async fn batch_fetch_chunked<S: AsRef<str>>(&self, urls: &[S]) -> Vec<FetchResult> {
        let batch_size = self.config.batch_size.max(1);
        let mut results = Vec::with_capacity(urls.len());

        for (index, chunk) in urls.chunks(batch_size).enumerate() {
            if index > 0 {
                sleep(self.config.batch_delay()).await;
            }
            debug!(chunk = index, size = chunk.len(), "Fetching batch chunk");
            results.extend(join_all(chunk.iter().map(|url| self.fetch_one(url.as_ref()))).await);
        }

        log_summary("chunked fetch", results.iter().filter(|r| r.success).count(), results.len());
        results
    }

    /// Writes entries in chunks of the configured size.
    pub async fn batch_cache_operation(&self, ops: Vec<CacheOp>) -> Vec<OpResult> {
        self.batch_cache_operation_with(ops, self.config.batch_size).await
    }

    pub async fn batch_cache_operation_with(&self, ops: Vec<CacheOp>, batch_size: usize) -> Vec<OpResult> {
        let batch_size = batch_size.max(1);
        let store = self.store();
        let mut results = Vec::with_capacity(ops.len());

        for (index, chunk) in ops.chunks(batch_size).enumerate() {
            if index > 0 {
                sleep(self.config.batch_delay()).await;
            }
            let writes = chunk.iter().map(|op| async move {
                let success = store
                    .set_in(op.partition, &op.key, op.value.clone(), op.ttl)
                    .await;
                OpResult {
                    key: op.key.clone(),
                    success,
                }
            });
            results.extend(join_all(writes).await);
        }

        log_summary("cache write", results.iter().filter(|r| r.success).count(), results.len());
        results
    }

    async fn fetch_one(&self, url: &str) -> FetchResult {
        FetchResult::from_outcome(url, self.client.fetch(url).await)
    }
}

fn log_summary(what: &str, succeeded: usize, total: usize) {
    if succeeded < total {
        info!(what, succeeded, failed = total - succeeded, "Batch finished with failures");
    } else {
        debug!(what, total, "Batch finished");
    }
}
