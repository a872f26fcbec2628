use crate::cache::{Cache, as_counter};
use crate::config::cache::Cache as CacheConfig;
use crate::error::cache::CacheError;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Bounds how many times the same job handle is executed, using a counter in the cache.
///
/// The check reads the counter and then initializes or increments it in a separate call, so two
/// workers receiving the same handle at the same moment may both see it absent. The threshold is
/// a soft ceiling.
#[derive(Clone)]
pub struct RetryLimiter {
    cache: Arc<dyn Cache>,
    key_prefix: String,
    threshold: i64,
}

impl RetryLimiter {
    pub fn new(cache: Arc<dyn Cache>, config: &CacheConfig) -> Self {
        Self {
            cache,
            key_prefix: config.key_prefix.clone(),
            threshold: config.retry_threshold,
        }
    }

    pub fn key(&self, handle: &str) -> String {
        format!("{}{handle}", self.key_prefix)
    }

    /// Record an attempt for `handle` and return whether it may run.
    pub async fn admit(&self, handle: &str) -> Result<bool, CacheError> {
        let key = self.key(handle);
        let attempts = match self.cache.get(&key).await? {
            None | Some(Value::Null) => {
                self.cache.set(&key, Value::from(1)).await?;
                return Ok(true);
            }
            Some(value) => {
                as_counter(&value).ok_or_else(|| CacheError::NotANumber(key.clone()))?
            }
        };
        if attempts > self.threshold {
            debug!(handle, attempts, "Retry threshold exceeded");
            return Ok(false);
        }
        self.cache.increment(&key).await?;
        Ok(true)
    }

    /// Forget the attempts recorded for `handle`.
    pub async fn clear(&self, handle: &str) -> Result<(), CacheError> {
        self.cache.delete(&self.key(handle)).await
    }
}
