//! The destination-resident `KeyValueStore`: every instance is a `group_id`
//! partition of one shared scratch table, so millions of candidate keys
//! spill to the destination database's own sort/hash machinery instead of
//! process memory.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use model::store_trait::{KeyValueStore, StoreError};
use sql::SqlProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// One `group_id` partition of the shared `storage_data`-shaped scratch
/// table, scoped to a single table's working set for one run.
pub struct ScratchTableStore {
    pool: Pool,
    sql: Arc<dyn SqlProvider>,
    table_name: String,
    group_id: i32,
    known_non_empty: AtomicBool,
}

impl std::fmt::Debug for ScratchTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchTableStore")
            .field("table_name", &self.table_name)
            .field("group_id", &self.group_id)
            .finish()
    }
}

/// Rows are paged at this size regardless of the caller's requested chunk
/// size, to bound how much a single `LIMIT/OFFSET` query holds at once.
const PAGE_SIZE: i64 = 10_000;

impl ScratchTableStore {
    pub fn new(pool: Pool, sql: Arc<dyn SqlProvider>, table_name: String, group_id: i32) -> Self {
        ScratchTableStore {
            pool,
            sql,
            table_name,
            group_id,
            known_non_empty: AtomicBool::new(false),
        }
    }

    pub fn group_id(&self) -> i32 {
        self.group_id
    }

    async fn client(&self) -> Result<deadpool_postgres::Client, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::with_source("failed to acquire destination connection", e))
    }
}

#[async_trait]
impl KeyValueStore for ScratchTableStore {
    async fn insert_many(&self, values: &[String]) -> Result<(), StoreError> {
        if values.is_empty() {
            return Ok(());
        }
        let client = self.client().await?;
        let statement = self
            .sql
            .scratch_insert(&self.table_name)
            .map_err(|e| StoreError::with_source("invalid scratch table name", e))?;
        for value in values {
            client
                .execute(&statement, &[&self.group_id, value])
                .await
                .map_err(|e| StoreError::with_source("scratch table insert failed", e))?;
        }
        self.known_non_empty.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn insert_from(&self, other: &dyn KeyValueStore) -> Result<(), StoreError> {
        for chunk in other.chunks(PAGE_SIZE as usize).await? {
            self.insert_many(&chunk).await?;
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let client = self.client().await?;
        let statement = self
            .sql
            .scratch_count(&self.table_name)
            .map_err(|e| StoreError::with_source("invalid scratch table name", e))?;
        let row = client
            .query_one(&statement, &[&self.group_id])
            .await
            .map_err(|e| StoreError::with_source("scratch table count failed", e))?;
        let count: i64 = row.get("count");
        Ok(count.max(0) as usize)
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
        let client = self.client().await?;
        let statement = self
            .sql
            .scratch_page(&self.table_name)
            .map_err(|e| StoreError::with_source("invalid scratch table name", e))?;

        let mut out = Vec::new();
        let mut current = Vec::new();
        let mut offset: i64 = 0;
        loop {
            let rows = client
                .query(&statement, &[&self.group_id, &PAGE_SIZE, &offset])
                .await
                .map_err(|e| StoreError::with_source("scratch table page read failed", e))?;
            if rows.is_empty() {
                break;
            }
            for row in &rows {
                let value: String = row.get("data");
                current.push(value);
                if current.len() >= chunk_size {
                    out.push(std::mem::take(&mut current));
                }
            }
            offset += PAGE_SIZE;
        }
        if !current.is_empty() {
            out.push(current);
        }
        debug!(table = %self.table_name, group_id = self.group_id, chunks = out.len(), "paged scratch store");
        Ok(out)
    }

    async fn difference(&self, other: &dyn KeyValueStore) -> Result<Vec<String>, StoreError> {
        let other_group_id = other
            .as_any_group_id()
            .ok_or_else(|| StoreError::new("difference requires two scratch-table stores"))?;

        let client = self.client().await?;
        let statement = self
            .sql
            .scratch_difference_page(&self.table_name)
            .map_err(|e| StoreError::with_source("invalid scratch table name", e))?;

        let mut out = Vec::new();
        let mut offset: i64 = 0;
        loop {
            let rows = client
                .query(&statement, &[&self.group_id, &other_group_id, &PAGE_SIZE, &offset])
                .await
                .map_err(|e| StoreError::with_source("scratch table difference page failed", e))?;
            if rows.is_empty() {
                break;
            }
            out.extend(rows.iter().map(|row| row.get::<_, String>("data")));
            offset += PAGE_SIZE;
        }
        Ok(out)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let client = self.client().await?;
        let statement = self
            .sql
            .scratch_delete_group(&self.table_name)
            .map_err(|e| StoreError::with_source("invalid scratch table name", e))?;
        client
            .execute(&statement, &[&self.group_id])
            .await
            .map_err(|e| StoreError::with_source("scratch table group delete failed", e))?;
        self.known_non_empty.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn as_any_group_id(&self) -> Option<i32> {
        Some(self.group_id)
    }
}
