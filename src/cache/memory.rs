use crate::cache::{Cache, as_counter};
use crate::error::cache::CacheError;
use crate::error::mutex::MutexError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A process-local [`Cache`]. Clones share their entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Default::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<String, Value>>, CacheError> {
        self.entries
            .lock()
            .map_err(|err| CacheError::from(MutexError::from(err)))
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.entries()?.insert(key.to_owned(), value);
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<Option<i64>, CacheError> {
        let mut entries = self.entries()?;
        let Some(value) = entries.get_mut(key) else {
            return Ok(None);
        };
        let next = as_counter(value)
            .ok_or_else(|| CacheError::NotANumber(key.to_owned()))?
            .checked_add(1)
            .ok_or_else(|| CacheError::Overflow(key.to_owned()))?;
        *value = Value::from(next);
        Ok(Some(next))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries()?.remove(key);
        Ok(())
    }
}
