//! §4.4: streams a table's pending rows from source to destination in
//! chunks, then advances serial sequences with slack.

use crate::error::TransportError;
use deadpool_postgres::Pool;
use model::schema_types::{SchemaGraph, Table};
use model::store_trait::KeyValueStore;
use sql::{ColumnDef, SqlProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Slack added above the source's `max(pk)` when advancing a destination
/// sequence, so concurrent writers on the destination never collide with a
/// PK the source still might use (§4.4, §8).
pub const SEQUENCE_SLACK: i64 = 100_000;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub schema_name: String,
    pub transfer_chunk_size: usize,
    /// The `host=... port=... dbname=... user=... password=...` string the
    /// destination's `dblink` call uses to reach the source.
    pub src_connection_string: String,
}

#[derive(Debug, Clone)]
pub struct TableTransferReport {
    pub table: String,
    pub transferred_pks_count: usize,
}

pub struct Transporter {
    destination_pool: Pool,
    sql: Arc<dyn SqlProvider>,
    config: TransportConfig,
}

impl std::fmt::Debug for Transporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transporter").field("config", &self.config).finish()
    }
}

impl Transporter {
    pub fn new(destination_pool: Pool, sql: Arc<dyn SqlProvider>, config: TransportConfig) -> Self {
        Transporter { destination_pool, sql, config }
    }

    /// Transfers every pending PK of `table`, chunked at
    /// `transfer_chunk_size`. Tables without a detectable primary key are
    /// logged and skipped rather than failed (§4.4).
    pub async fn transfer_table(
        &self,
        table: &Table,
        store: &dyn KeyValueStore,
    ) -> Result<TableTransferReport, TransportError> {
        let Some(pk) = table.primary_key() else {
            warn!(table = %table.name, "no usable primary key; skipping transfer");
            return Ok(TableTransferReport { table: table.name.clone(), transferred_pks_count: 0 });
        };

        let is_empty = store
            .is_empty()
            .await
            .map_err(|source| TransportError::Store { table: table.name.clone(), source })?;
        if is_empty {
            return Ok(TableTransferReport { table: table.name.clone(), transferred_pks_count: 0 });
        }

        let columns: Vec<ColumnDef> = table
            .columns
            .iter()
            .map(|c| ColumnDef { name: c.name.clone(), data_type: c.data_type.clone() })
            .collect();

        let mut transferred = 0usize;
        let chunks = store
            .chunks(self.config.transfer_chunk_size)
            .await
            .map_err(|source| TransportError::Store { table: table.name.clone(), source })?;

        for chunk in chunks {
            let statement = self
                .sql
                .transfer_chunk(
                    &self.config.schema_name,
                    &table.name,
                    &columns,
                    &pk.name,
                    &self.config.src_connection_string,
                    &chunk,
                )
                .map_err(|source| TransportError::InvalidIdentifier { table: table.name.clone(), source })?;

            let client = self.destination_pool.get().await.map_err(TransportError::Pool)?;
            let rows = client.query(&statement, &[]).await.map_err(|source| TransportError::DataShape {
                table: table.name.clone(),
                statement: statement.clone(),
                source,
            })?;
            transferred += rows.len();
        }

        info!(table = %table.name, count = transferred, "table transferred");
        Ok(TableTransferReport { table: table.name.clone(), transferred_pks_count: transferred })
    }

    /// `set_max_tables_sequences()`: for every table with a serial-backed
    /// primary key, advances its destination sequence to
    /// `max(source pk) + SEQUENCE_SLACK`.
    pub async fn set_max_tables_sequences(&self, graph: &SchemaGraph) -> Result<(), TransportError> {
        for table in graph.tables.values() {
            let Some(pk) = table.primary_key() else { continue };
            let Some(max_pk) = table.max_pk else { continue };

            let client = self.destination_pool.get().await.map_err(TransportError::Pool)?;
            let seq_query = self
                .sql
                .serial_sequence_name(&self.config.schema_name, &table.name, &pk.name)
                .map_err(|source| TransportError::InvalidIdentifier { table: table.name.clone(), source })?;
            let row = client
                .query_one(&seq_query, &[])
                .await
                .map_err(|source| TransportError::SequenceAdvance { table: table.name.clone(), source })?;
            let sequence_name: Option<String> = row.get("sequence_name");
            let Some(sequence_name) = sequence_name else { continue };

            let target = max_pk.saturating_add(SEQUENCE_SLACK);
            let setval_query = self.sql.setval();
            client
                .execute(&setval_query, &[&sequence_name, &target])
                .await
                .map_err(|source| TransportError::SequenceAdvance { table: table.name.clone(), source })?;
            info!(table = %table.name, sequence = %sequence_name, target, "sequence advanced");
        }
        Ok(())
    }
}
