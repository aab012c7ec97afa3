//! Owns the process-global scratch-table group-id counter and the
//! destination connection pool, so no part of the engine reaches for a
//! bare static counter the way the original implementation did.

use crate::in_memory::InMemoryStore;
use crate::scratch_table::ScratchTableStore;
use deadpool_postgres::Pool;
use model::store_trait::{KeyValueStore, StoreError};
use sql::SqlProvider;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Builds [`KeyValueStore`] instances for each table's working set, using
/// either implementation behind the same trait object so the rest of the
/// engine never branches on which one it got.
pub struct StoreFactory {
    destination_pool: Pool,
    sql: Arc<dyn SqlProvider>,
    scratch_table_name: String,
    use_database_store: bool,
    next_group_id: AtomicI32,
}

impl StoreFactory {
    pub fn new(
        destination_pool: Pool,
        sql: Arc<dyn SqlProvider>,
        scratch_table_name: String,
        use_database_store: bool,
    ) -> Self {
        StoreFactory {
            destination_pool,
            sql,
            scratch_table_name,
            use_database_store,
            next_group_id: AtomicI32::new(1),
        }
    }

    /// Creates a fresh, empty working set. Each call allocates a new
    /// monotonic group id when backed by the scratch table, so concurrent
    /// callers never collide.
    pub fn new_store(&self) -> Box<dyn KeyValueStore> {
        if self.use_database_store {
            let group_id = self.next_group_id.fetch_add(1, Ordering::SeqCst);
            Box::new(ScratchTableStore::new(
                self.destination_pool.clone(),
                Arc::clone(&self.sql),
                self.scratch_table_name.clone(),
                group_id,
            ))
        } else {
            Box::new(InMemoryStore::new())
        }
    }

    /// Idempotently (re)creates the shared scratch table. A no-op when the
    /// in-memory implementation is selected.
    pub async fn ensure_scratch_table(&self) -> Result<(), StoreError> {
        if !self.use_database_store {
            return Ok(());
        }
        let client = self
            .destination_pool
            .get()
            .await
            .map_err(|e| StoreError::with_source("failed to acquire destination connection", e))?;
        let ddl = self
            .sql
            .create_scratch_table(&self.scratch_table_name)
            .map_err(|e| StoreError::with_source("invalid scratch table name", e))?;
        client
            .batch_execute(&ddl)
            .await
            .map_err(|e| StoreError::with_source("failed to create scratch table", e))?;
        Ok(())
    }

    /// Drops the shared scratch table at the end of a run. A no-op when the
    /// in-memory implementation is selected.
    pub async fn drop_scratch_table(&self) -> Result<(), StoreError> {
        if !self.use_database_store {
            return Ok(());
        }
        let client = self
            .destination_pool
            .get()
            .await
            .map_err(|e| StoreError::with_source("failed to acquire destination connection", e))?;
        let ddl = self
            .sql
            .drop_scratch_table(&self.scratch_table_name)
            .map_err(|e| StoreError::with_source("invalid scratch table name", e))?;
        client
            .batch_execute(&ddl)
            .await
            .map_err(|e| StoreError::with_source("failed to drop scratch table", e))?;
        Ok(())
    }
}

impl std::fmt::Debug for StoreFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreFactory")
            .field("scratch_table_name", &self.scratch_table_name)
            .field("use_database_store", &self.use_database_store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `new_store` with the in-memory backend needs no database, so it is
    // exercised here; the scratch-table path is covered by this crate's
    // `tests/scratch_table_pg.rs`, which stands up a real Postgres instance.
    #[tokio::test]
    async fn in_memory_backend_never_touches_group_ids() {
        let pool = deadpool_test_pool();
        let factory = StoreFactory::new(
            pool,
            Arc::new(sql::PostgresSqlProvider),
            "storage_data".to_string(),
            false,
        );
        let store = factory.new_store();
        assert!(store.is_empty().await.unwrap());
        store.insert_many(&["1".to_string()]).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
    }

    fn deadpool_test_pool() -> Pool {
        let mut config = deadpool_postgres::Config::new();
        config.host = Some("localhost".to_string());
        config.dbname = Some("unused".to_string());
        config
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
            .expect("pool construction is lazy and never connects")
    }
}
