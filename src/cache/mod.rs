//! The cache contract the engine relies on. Missing keys are `None`, never an error.

use crate::error::cache::CacheError;
use async_trait::async_trait;
use serde_json::Value;

pub mod memory;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;

    /// Increment the counter stored at `key` by one. Returns the new value, or `None` if the key
    /// does not exist. Counters stored as numeric strings are accepted, see [`as_counter`].
    async fn increment(&self, key: &str) -> Result<Option<i64>, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Read a cached value as a counter: an integer, or a string holding one (as written by caches
/// that store everything as text).
pub fn as_counter(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
