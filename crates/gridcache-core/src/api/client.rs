//! Cache-first, throttled HTTP client.
//!
//! `CachedClient::fetch` consults the [`Store`] first. On a miss it runs a
//! bounded retry loop: throttle clearance, GET, response checks, then a
//! write-back with the TTL of the URL's freshness class.

use std::sync::Arc;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::transport::{HttpResponse, ReqwestTransport, Transport};
use super::ttl::TtlPolicy;
use super::FetchError;
use crate::config::{Config, RetryConfig, TtlConfig};
use crate::store::{Partition, Store};
use crate::throttle::Throttler;
use crate::validate;

/// Clone is cheap; every shared component sits behind an `Arc`.
#[derive(Clone)]
pub struct CachedClient {
    store: Arc<Store>,
    throttler: Arc<Throttler>,
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
    ttl: TtlConfig,
}

impl CachedClient {
    pub fn new(
        store: Arc<Store>,
        throttler: Arc<Throttler>,
        transport: Arc<dyn Transport>,
        retry: RetryConfig,
        ttl: TtlConfig,
    ) -> Self {
        Self {
            store,
            throttler,
            transport,
            retry,
            ttl,
        }
    }

    /// Builds a client with a reqwest transport configured from `config`.
    pub fn from_config(
        config: &Config,
        store: Arc<Store>,
        throttler: Arc<Throttler>,
    ) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(&config.api)?;
        Ok(Self::new(
            store,
            throttler,
            Arc::new(transport),
            config.retry.clone(),
            config.ttl.clone(),
        ))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn ttl_config(&self) -> &TtlConfig {
        &self.ttl
    }

    /// Fetches `url` using the TTL class derived from the URL itself and the
    /// configured retry count.
    pub async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        self.fetch_with(url, TtlPolicy::classify(url), self.retry.max_retries)
            .await
    }

    /// Fetches `url`, caching a successful response under `policy`.
    ///
    /// Concurrent calls for the same URL are not merged; each one that misses
    /// the cache goes through the throttle and the network on its own.
    pub async fn fetch_with(
        &self,
        url: &str,
        policy: TtlPolicy,
        max_retries: u32,
    ) -> Result<Value, FetchError> {
        if let Some(cached) = self.store.get(url).await {
            debug!(url = %url, "Cache hit");
            return Ok(cached);
        }
        debug!(url = %url, ?policy, "Cache miss");

        let ttl = policy.resolve(&self.ttl);
        let attempts = max_retries.max(1);
        let mut attempt: u32 = 0;

        loop {
            self.throttler.acquire().await;

            match self.attempt(url).await {
                Ok(data) => {
                    if !self.store.set(url, data.clone(), ttl).await {
                        warn!(url = %url, "Fetched response could not be cached");
                    }
                    return Ok(data);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= attempts {
                        error!(url = %url, attempts, error = %e, "Fetch failed, retries exhausted");
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts,
                            last: Box::new(e),
                        });
                    }

                    let backoff = self.retry.backoff_for(attempt - 1);
                    warn!(
                        url = %url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Fetch attempt failed, backing off"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    /// Drops the cached response for `url` so the next fetch goes to the network.
    pub async fn invalidate(&self, url: &str) -> bool {
        self.store.remove_in(Partition::Cache, url).await
    }

    async fn attempt(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.transport.get(url).await?;
        Self::check_response(response)
    }

    /// Turns a raw response into a payload, or the reason it must be retried.
    fn check_response(response: HttpResponse) -> Result<Value, FetchError> {
        if !response.is_success() {
            return Err(FetchError::from_status(response.status, &response.body));
        }
        if response.body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        let data: Value = serde_json::from_str(&response.body)
            .map_err(|e| FetchError::InvalidResponse(format!("Malformed JSON: {}", e)))?;

        if let Some(message) = error_envelope(&data) {
            return Err(FetchError::Api(message));
        }
        if !validate::is_structured(&data) {
            return Err(FetchError::InvalidResponse(
                "expected a JSON object or array".to_string(),
            ));
        }
        Ok(data)
    }
}

/// Message of an application-level error envelope (`{"error": ...}`), which
/// the API may return even with a 200 status.
fn error_envelope(data: &Value) -> Option<String> {
    let error = data.as_object()?.get("error")?;
    let message = match error {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    };
    Some(message)
}
