//! The key-value working-set abstraction the collector accumulates
//! primary-key values into, and the transporter reads back out of.
//!
//! `model` stays driver-agnostic: the two concrete implementations
//! (in-memory and destination-resident scratch table) live in the `store`
//! crate, which depends on this trait rather than the other way around.

use async_trait::async_trait;
use std::fmt;

/// Failure from a working-set operation. The underlying driver error is
/// boxed so this crate never needs to depend on a specific Postgres client.
#[derive(Debug)]
pub struct StoreError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        StoreError {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as _)
    }
}

/// A set of primary-key values collected for one table during one run.
///
/// Values are carried as their textual representation; both
/// implementations (in-memory `HashSet<String>` and a destination-resident
/// scratch table keyed on a single text column) treat them opaquely.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Inserts `values`, ignoring duplicates already present.
    async fn insert_many(&self, values: &[String]) -> Result<(), StoreError>;

    /// Copies every value from `other` into `self`, ignoring duplicates.
    async fn insert_from(&self, other: &dyn KeyValueStore) -> Result<(), StoreError>;

    /// Number of distinct values currently held.
    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// All values, paged in chunks of at most `chunk_size` so a caller can
    /// bound memory use and transaction size.
    async fn chunks(&self, chunk_size: usize) -> Result<Vec<Vec<String>>, StoreError>;

    /// Values present in `self` but not in `other`.
    async fn difference(&self, other: &dyn KeyValueStore) -> Result<Vec<String>, StoreError>;

    /// Drops the backing storage (scratch table rows, or the in-memory set).
    async fn clear(&self) -> Result<(), StoreError>;

    /// Exposes the scratch-table `group_id` backing this store, when it has
    /// one. `difference` on the scratch-table implementation needs the
    /// other side's group id to run a single paged SQL query instead of
    /// materializing both sides in memory; the in-memory implementation has
    /// no group id and leaves this `None`.
    fn as_any_group_id(&self) -> Option<i32> {
        None
    }
}
