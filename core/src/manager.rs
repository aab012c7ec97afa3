//! The orchestrator: connects both databases, introspects, runs the
//! collector and transporter in sequence, and tidies up destination state
//! (§4.5).

use crate::error::CoreError;
use collector::{Collector, CollectorConfig, Seeds, StoreMap};
use deadpool_postgres::{Pool, Runtime};
use model::schema_types::SchemaGraph;
use model::{Config, DbConnectionParams, Stats, TracingStats};
use schema::{introspect, IntrospectionOptions};
use sql::{PostgresSqlProvider, SqlProvider};
use std::collections::HashSet;
use std::sync::Arc;
use store::StoreFactory;
use tracing::{info, warn};
use transport::{TransportConfig, Transporter};

/// The main entry point for a replication run, mirroring the single
/// `Manager.run()` call the rest of the system treats as a black box.
pub struct Manager {
    config: Config,
    stats: Box<dyn Stats>,
    sql: Arc<dyn SqlProvider>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager").field("config", &self.config).finish()
    }
}

impl Manager {
    pub fn new(config: Config, stats: Box<dyn Stats>) -> Self {
        Manager { config, stats, sql: Arc::new(PostgresSqlProvider) }
    }

    /// The resolved configuration, so the CLI can wire up logging before
    /// the first stage runs.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolves `Config::from_env` and builds a [`Manager`] that logs stage
    /// timings via `tracing`.
    pub fn from_env() -> Result<Self, CoreError> {
        let config = Config::from_env()?;
        Ok(Manager::new(config, Box::new(TracingStats)))
    }

    /// Runs every stage in the order §4.5/§5 require: connect, introspect
    /// both sides in parallel, optionally initialize the scratch table,
    /// optionally truncate, disable triggers, collect, transfer, re-enable
    /// triggers (best-effort), close.
    pub async fn run(&self) -> Result<(), CoreError> {
        let source_pool = build_pool("source", &self.config.src_db)?;
        let destination_pool = build_pool("destination", &self.config.dst_db)?;

        let excluded_tables: HashSet<String> = self.config.excluded_tables.iter().cloned().collect();
        let generic_fk_tables: HashSet<String> =
            self.config.tables_with_generic_foreign_key.iter().cloned().collect();

        let source_options = IntrospectionOptions {
            schema_name: self.config.src_db.schema.clone(),
            key_table_name: self.config.key_table_name.clone(),
            key_column_names: self.config.key_column_names.clone(),
            key_table_hierarchy_column_name: self.config.key_table_hierarchy_column_name.clone(),
            excluded_tables: excluded_tables.clone(),
            generic_fk_tables: generic_fk_tables.clone(),
            scratch_table_name: self.config.scratch_table_name.clone(),
            tables_limit_per_transaction: self.config.tables_limit_per_transaction,
        };
        let destination_options = IntrospectionOptions { schema_name: self.config.dst_db.schema.clone(), ..source_options.clone() };

        let handle = self.stats.start_stage("introspect");
        let (graph, _destination_graph) = tokio::try_join!(
            introspect(&source_pool, &self.sql, &source_options),
            introspect(&destination_pool, &self.sql, &destination_options),
        )?;
        self.stats.finish_stage(handle);

        let store_factory = StoreFactory::new(
            destination_pool.clone(),
            Arc::clone(&self.sql),
            self.config.scratch_table_name.clone(),
            self.config.use_database_for_store_intermediate_values,
        );
        let handle = self.stats.start_stage("init_scratch_table");
        store_factory.ensure_scratch_table().await.map_err(CoreError::Store)?;
        self.stats.finish_stage(handle);

        if self.config.is_truncate_tables {
            let handle = self.stats.start_stage("truncate");
            self.truncate_tables(&destination_pool, &graph).await?;
            self.stats.finish_stage(handle);
        }

        let handle = self.stats.start_stage("disable_triggers");
        self.set_triggers(&destination_pool, &graph, false).await?;
        self.stats.finish_stage(handle);

        let run_result = self.collect_and_transfer(&source_pool, &destination_pool, &graph, &store_factory).await;

        // Trigger re-enable is best-effort: a failed collect/transfer must
        // not leave the destination with triggers permanently disabled.
        let handle = self.stats.start_stage("enable_triggers");
        if let Err(source) = self.set_triggers(&destination_pool, &graph, true).await {
            warn!(error = %source, "failed to re-enable destination triggers after run");
        }
        self.stats.finish_stage(handle);

        run_result?;

        if self.config.use_database_for_store_intermediate_values {
            store_factory.drop_scratch_table().await.map_err(CoreError::Store)?;
        }

        info!("run finished");
        Ok(())
    }

    async fn collect_and_transfer(
        &self,
        source_pool: &Pool,
        destination_pool: &Pool,
        graph: &SchemaGraph,
        store_factory: &StoreFactory,
    ) -> Result<(), CoreError> {
        let stores: StoreMap = graph.tables.keys().map(|name| (name.clone(), store_factory.new_store())).collect();

        let seeds = Seeds {
            key_table_name: self.config.key_table_name.clone(),
            key_column_values: self.config.key_column_values.iter().map(ToString::to_string).collect(),
            full_transfer_tables: self.config.full_transfer_tables.iter().cloned().collect(),
        };

        let collector = Collector::new(
            source_pool.clone(),
            Arc::clone(&self.sql),
            CollectorConfig {
                schema_name: self.config.src_db.schema.clone(),
                collector_chunk_size: self.config.collector_chunk_size,
                async_separation_coefficient: self.config.async_separation_coefficient,
                validate_data_before_transferring: self.config.validate_data_before_transferring,
            },
        );

        let handle = self.stats.start_stage("collect");
        collector.collect(graph, &stores, &seeds).await?;
        self.stats.finish_stage(handle);

        let transporter = Transporter::new(
            destination_pool.clone(),
            Arc::clone(&self.sql),
            TransportConfig {
                schema_name: self.config.dst_db.schema.clone(),
                transfer_chunk_size: self.config.transfer_chunk_size,
                src_connection_string: self.config.src_db.connection_string(),
            },
        );

        let handle = self.stats.start_stage("transfer");
        for (name, store) in &stores {
            let Some(table) = graph.tables.get(name) else { continue };
            let report = transporter.transfer_table(table, store.as_ref()).await?;
            self.stats.record_table(name, report.transferred_pks_count);
        }
        transporter.set_max_tables_sequences(graph).await?;
        self.stats.finish_stage(handle);

        Ok(())
    }

    async fn truncate_tables(&self, pool: &Pool, graph: &SchemaGraph) -> Result<(), CoreError> {
        let included: HashSet<&str> = self.config.tables_truncate_included.iter().map(String::as_str).collect();
        let excluded: HashSet<&str> = self.config.tables_truncate_excluded.iter().map(String::as_str).collect();

        let tables: Vec<String> = graph
            .tables
            .keys()
            .filter(|name| !graph.generic_fk_tables.contains(*name))
            .filter(|name| included.is_empty() || included.contains(name.as_str()))
            .filter(|name| !excluded.contains(name.as_str()))
            .cloned()
            .collect();
        if tables.is_empty() {
            return Ok(());
        }

        let statement = self
            .sql
            .truncate(&self.config.dst_db.schema, &tables)
            .map_err(|source| CoreError::InvalidIdentifier { action: "truncate", source })?;
        let client = pool.get().await.map_err(|source| CoreError::Pool { side: "destination", source })?;
        client
            .batch_execute(&statement)
            .await
            .map_err(|source| CoreError::Statement { action: "truncate", side: "destination", source })?;
        Ok(())
    }

    async fn set_triggers(&self, pool: &Pool, graph: &SchemaGraph, enable: bool) -> Result<(), CoreError> {
        for name in graph.tables.keys() {
            let statement = if enable {
                self.sql.enable_triggers(&self.config.dst_db.schema, name)
            } else {
                self.sql.disable_triggers(&self.config.dst_db.schema, name)
            }
            .map_err(|source| CoreError::InvalidIdentifier { action: "trigger toggle", source })?;
            let client = pool.get().await.map_err(|source| CoreError::Pool { side: "destination", source })?;
            client
                .batch_execute(&statement)
                .await
                .map_err(|source| CoreError::Statement { action: "trigger toggle", side: "destination", source })?;
        }
        Ok(())
    }
}

fn build_pool(side: &'static str, params: &DbConnectionParams) -> Result<Pool, CoreError> {
    let mut cfg = deadpool_postgres::Config::new();
    cfg.host = Some(params.host.clone());
    cfg.port = Some(params.port.parse().unwrap_or(5432));
    cfg.dbname = Some(params.dbname.clone());
    cfg.user = Some(params.user.clone());
    cfg.password = Some(params.password.clone());
    cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
        .map_err(|source| CoreError::PoolBuild { side, source })
}
