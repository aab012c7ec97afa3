//! The fixed-point FK traversal (§4.3): seeds each table's working set from
//! the configured key, then alternates forward and reverse pulls until a
//! full pass adds nothing new.

use crate::error::CollectorError;
use deadpool_postgres::Pool;
use futures::stream::{self, StreamExt};
use model::schema_types::SchemaGraph;
use model::store_trait::KeyValueStore;
use sql::SqlProvider;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Slack subtracted from a table's `full_count` when deciding whether its
/// collected set looks "fully transferred" for the optional validation log
/// (§4.3, §9 — diagnostic only, never an input to what gets transferred).
const INACCURACY_COUNT: u64 = 100;

/// The subset of `Config` the collector reads.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub schema_name: String,
    pub collector_chunk_size: usize,
    /// `≤ 0` means unbounded concurrency within one pass.
    pub async_separation_coefficient: i64,
    pub validate_data_before_transferring: bool,
}

impl CollectorConfig {
    fn concurrency_limit(&self) -> usize {
        if self.async_separation_coefficient <= 0 {
            usize::MAX
        } else {
            self.async_separation_coefficient as usize
        }
    }
}

/// The seed set a collection run starts from.
#[derive(Debug, Clone)]
pub struct Seeds {
    pub key_table_name: String,
    /// `KEY_COLUMN_VALUES`, already rendered as text.
    pub key_column_values: Vec<String>,
    pub full_transfer_tables: HashSet<String>,
}

/// One table's working set, indexed by table name. Built once (one store
/// per introspected table) and handed to [`Collector::collect`]; the map
/// itself is never mutated after construction, only the stores it points
/// at, so concurrent table-level tasks never contend on the map.
pub type StoreMap = HashMap<String, Box<dyn KeyValueStore>>;

pub struct Collector {
    source_pool: Pool,
    sql: Arc<dyn SqlProvider>,
    config: CollectorConfig,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector").field("config", &self.config).finish()
    }
}

impl Collector {
    pub fn new(source_pool: Pool, sql: Arc<dyn SqlProvider>, config: CollectorConfig) -> Self {
        Collector { source_pool, sql, config }
    }

    /// Runs seeding followed by fixed-point expansion. On return, every
    /// table's store in `stores` holds its full transitively-required PK
    /// set (§8's forward/reverse-pull invariants).
    pub async fn collect(
        &self,
        graph: &SchemaGraph,
        stores: &StoreMap,
        seeds: &Seeds,
    ) -> Result<(), CollectorError> {
        self.seed(graph, stores, seeds).await?;

        let limit = self.config.concurrency_limit();
        let mut pass = 0u32;
        loop {
            pass += 1;
            let table_names: Vec<String> = graph
                .tables
                .keys()
                .filter(|name| !graph.generic_fk_tables.contains(*name))
                .cloned()
                .collect();

            let forward_changes: Vec<bool> = stream::iter(table_names.iter().cloned())
                .map(|name| self.forward_pull_table(graph, stores, name))
                .buffer_unordered(limit)
                .collect::<Vec<Result<bool, CollectorError>>>()
                .await
                .into_iter()
                .collect::<Result<Vec<bool>, CollectorError>>()?;

            let key_scoped_names: Vec<String> = graph
                .tables_with_key_column()
                .into_iter()
                .map(|t| t.name.clone())
                .collect();

            let reverse_changes: Vec<bool> = stream::iter(key_scoped_names)
                .map(|name| self.reverse_pull_table(graph, stores, name))
                .buffer_unordered(limit)
                .collect::<Vec<Result<bool, CollectorError>>>()
                .await
                .into_iter()
                .collect::<Result<Vec<bool>, CollectorError>>()?;

            let any_change = forward_changes.into_iter().any(|c| c) || reverse_changes.into_iter().any(|c| c);
            debug!(pass, any_change, "collector pass finished");
            if !any_change {
                info!(passes = pass, "collector reached fixed point");
                break;
            }
        }

        if self.config.validate_data_before_transferring {
            self.log_validation(graph, stores).await?;
        }
        Ok(())
    }

    /// Logs, per table, whether the collected set is within
    /// [`INACCURACY_COUNT`] of the table's full row count. Diagnostic only:
    /// it never changes which rows get transferred.
    async fn log_validation(&self, graph: &SchemaGraph, stores: &StoreMap) -> Result<(), CollectorError> {
        for table in graph.tables.values() {
            let Some(full_count) = table.full_count else { continue };
            let Some(store) = stores.get(&table.name) else { continue };
            let collected = store
                .len()
                .await
                .map_err(|source| CollectorError::Store { table: table.name.clone(), source })?;
            let fully_transferred = (collected as u64).saturating_add(INACCURACY_COUNT) >= full_count;
            debug!(table = %table.name, collected, full_count, fully_transferred, "validation");
        }
        Ok(())
    }

    async fn seed(&self, graph: &SchemaGraph, stores: &StoreMap, seeds: &Seeds) -> Result<(), CollectorError> {
        if let Some(store) = stores.get(&seeds.key_table_name) {
            store
                .insert_many(&seeds.key_column_values)
                .await
                .map_err(|source| CollectorError::Store { table: seeds.key_table_name.clone(), source })?;
        }

        for table in graph.tables.values() {
            if graph.generic_fk_tables.contains(&table.name) {
                continue;
            }
            let Some(pk) = table.primary_key() else { continue };
            let Some(store) = stores.get(&table.name) else { continue };

            for column in &table.columns {
                if !column.is_foreign_key() || table.is_self_fk(column) {
                    continue;
                }
                if column.constraint_table.as_deref() != Some(seeds.key_table_name.as_str()) {
                    continue;
                }
                if !graph.is_key_column(column) {
                    continue;
                }
                let values = self
                    .fetch_membership(&table.name, &pk.name, &column.name, &seeds.key_column_values)
                    .await?;
                store
                    .insert_many(&values)
                    .await
                    .map_err(|source| CollectorError::Store { table: table.name.clone(), source })?;
            }
        }

        for name in &seeds.full_transfer_tables {
            let Some(table) = graph.tables.get(name) else { continue };
            let Some(pk) = table.primary_key() else { continue };
            let Some(store) = stores.get(name) else { continue };

            let query = self.sql.select_all(&self.config.schema_name, name, &pk.name)?;
            let client = self.source_pool.get().await.map_err(CollectorError::Pool)?;
            let rows = client
                .query(&query, &[])
                .await
                .map_err(|source| CollectorError::Query { table: name.clone(), source })?;
            let values = rows_to_text(name, &rows)?;
            store
                .insert_many(&values)
                .await
                .map_err(|source| CollectorError::Store { table: name.clone(), source })?;
        }

        Ok(())
    }

    /// Forward pull for one table: for each highest-priority FK column,
    /// fetch the referent keys its pending rows require and insert them
    /// into the referent's store. Returns whether any referent store grew.
    async fn forward_pull_table(
        &self,
        graph: &SchemaGraph,
        stores: &StoreMap,
        table_name: String,
    ) -> Result<bool, CollectorError> {
        let Some(table) = graph.tables.get(&table_name) else { return Ok(false) };
        let Some(pk) = table.primary_key() else { return Ok(false) };
        let Some(store) = stores.get(&table_name) else { return Ok(false) };
        if store
            .is_empty()
            .await
            .map_err(|source| CollectorError::Store { table: table_name.clone(), source })?
        {
            return Ok(false);
        }

        let fk_columns: Vec<(String, String)> = graph
            .highest_priority_fk_columns(table)
            .into_iter()
            .filter_map(|c| c.constraint_table.clone().map(|referent| (c.name.clone(), referent)))
            .collect();
        if fk_columns.is_empty() {
            return Ok(false);
        }

        let mut changed = false;
        for chunk in store
            .chunks(self.config.collector_chunk_size)
            .await
            .map_err(|source| CollectorError::Store { table: table_name.clone(), source })?
        {
            for (fk_column, referent) in &fk_columns {
                let Some(referent_store) = stores.get(referent) else { continue };
                let values = self.fetch_membership(&table_name, fk_column, &pk.name, &chunk).await?;
                if values.is_empty() {
                    continue;
                }
                let before = referent_store
                    .len()
                    .await
                    .map_err(|source| CollectorError::Store { table: referent.clone(), source })?;
                referent_store
                    .insert_many(&values)
                    .await
                    .map_err(|source| CollectorError::Store { table: referent.clone(), source })?;
                let after = referent_store
                    .len()
                    .await
                    .map_err(|source| CollectorError::Store { table: referent.clone(), source })?;
                changed |= after > before;
            }
        }
        Ok(changed)
    }

    /// Reverse pull for one `with_key_column` table `r_name`: for every
    /// table referencing it, fetch rows whose FK columns land in `r_name`'s
    /// pending keys and insert their own PKs into the referencing table.
    async fn reverse_pull_table(
        &self,
        graph: &SchemaGraph,
        stores: &StoreMap,
        r_name: String,
    ) -> Result<bool, CollectorError> {
        let Some(r_table) = graph.tables.get(&r_name) else { return Ok(false) };
        let Some(r_store) = stores.get(&r_name) else { return Ok(false) };
        if r_store
            .is_empty()
            .await
            .map_err(|source| CollectorError::Store { table: r_name.clone(), source })?
        {
            return Ok(false);
        }

        let mut changed = false;
        for (t_name, cols) in &r_table.revert_foreign_tables {
            if graph.generic_fk_tables.contains(t_name) {
                continue;
            }
            let Some(t_table) = graph.tables.get(t_name) else { continue };
            let Some(t_pk) = t_table.primary_key() else { continue };
            let Some(t_store) = stores.get(t_name) else { continue };

            for col_name in cols {
                for chunk in r_store
                    .chunks(self.config.collector_chunk_size)
                    .await
                    .map_err(|source| CollectorError::Store { table: r_name.clone(), source })?
                {
                    let values = self.fetch_membership(t_name, &t_pk.name, col_name, &chunk).await?;
                    if values.is_empty() {
                        continue;
                    }
                    let before = t_store
                        .len()
                        .await
                        .map_err(|source| CollectorError::Store { table: t_name.clone(), source })?;
                    t_store
                        .insert_many(&values)
                        .await
                        .map_err(|source| CollectorError::Store { table: t_name.clone(), source })?;
                    let after = t_store
                        .len()
                        .await
                        .map_err(|source| CollectorError::Store { table: t_name.clone(), source })?;
                    changed |= after > before;
                }
            }
        }
        Ok(changed)
    }

    /// `SELECT DISTINCT select_column FROM table WHERE filter_column::text
    /// = ANY(values)`, converted to text.
    async fn fetch_membership(
        &self,
        table: &str,
        select_column: &str,
        filter_column: &str,
        values: &[String],
    ) -> Result<Vec<String>, CollectorError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let query = self
            .sql
            .select_distinct_by_membership(&self.config.schema_name, table, select_column, filter_column)?;
        let client = self.source_pool.get().await.map_err(CollectorError::Pool)?;
        let rows = client
            .query(&query, &[&values])
            .await
            .map_err(|source| CollectorError::Query { table: table.to_string(), source })?;
        rows_to_text(table, &rows)
    }
}

fn rows_to_text(table: &str, rows: &[tokio_postgres::Row]) -> Result<Vec<String>, CollectorError> {
    rows.iter()
        .map(|row| store::column_as_text(row, 0).map_err(|source| CollectorError::Value { table: table.to_string(), source }))
        .collect()
}
