//! The in-memory `KeyValueStore`: a plain set of strings, adequate when a
//! slice's candidate-key count comfortably fits in process memory.

use async_trait::async_trait;
use model::store_trait::{KeyValueStore, StoreError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Unordered, process-local working set. Iteration order is unspecified;
/// callers must not depend on it (the scratch-table variant orders
/// lexicographically on `data`, this one does not).
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: Mutex<HashSet<String>>,
    known_non_empty: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn insert_many(&self, values: &[String]) -> Result<(), StoreError> {
        if values.is_empty() {
            return Ok(());
        }
        let mut guard = self
            .values
            .lock()
            .map_err(|_| StoreError::new("in-memory store mutex poisoned"))?;
        guard.extend(values.iter().cloned());
        self.known_non_empty.store(!guard.is_empty(), Ordering::Relaxed);
        Ok(())
    }

    async fn insert_from(&self, other: &dyn KeyValueStore) -> Result<(), StoreError> {
        let mut chunks = other.chunks(usize::MAX).await?;
        for chunk in chunks.drain(..) {
            self.insert_many(&chunk).await?;
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let guard = self
            .values
            .lock()
            .map_err(|_| StoreError::new("in-memory store mutex poisoned"))?;
        Ok(guard.len())
    }

    async fn is_empty(&self) -> Result<bool, StoreError> {
        if self.known_non_empty.load(Ordering::Relaxed) {
            return Ok(false);
        }
        let empty = self.len().await? == 0;
        if !empty {
            self.known_non_empty.store(true, Ordering::Relaxed);
        }
        Ok(empty)
    }

    async fn chunks(&self, chunk_size: usize) -> Result<Vec<Vec<String>>, StoreError> {
        let guard = self
            .values
            .lock()
            .map_err(|_| StoreError::new("in-memory store mutex poisoned"))?;
        if guard.is_empty() || chunk_size == 0 {
            return Ok(Vec::new());
        }
        Ok(guard
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .chunks(chunk_size)
            .map(<[String]>::to_vec)
            .collect())
    }

    async fn difference(&self, other: &dyn KeyValueStore) -> Result<Vec<String>, StoreError> {
        let other_values: HashSet<String> = other
            .chunks(usize::MAX)
            .await?
            .into_iter()
            .flatten()
            .collect();
        let guard = self
            .values
            .lock()
            .map_err(|_| StoreError::new("in-memory store mutex poisoned"))?;
        Ok(guard.difference(&other_values).cloned().collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut guard = self
            .values
            .lock()
            .map_err(|_| StoreError::new("in-memory store mutex poisoned"))?;
        guard.clear();
        self.known_non_empty.store(false, Ordering::Relaxed);
        Ok(())
    }
}
