//! `prepare_structure()`: discovers tables, introspects their columns and
//! constraints in bounded chunks, wires the FK graph, and freezes it.

use crate::error::IntrospectionError;
use deadpool_postgres::Pool;
use futures::future::try_join_all;
use model::schema_types::{Column, ConstraintType, SchemaGraph, Table};
use sql::SqlProvider;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything [`introspect`] needs beyond the bare schema name: the pieces
/// of `Config` this crate actually reads. Kept as its own struct so `schema`
/// does not depend on the whole `Config` type from `model`.
#[derive(Debug, Clone)]
pub struct IntrospectionOptions {
    pub schema_name: String,
    pub key_table_name: String,
    pub key_column_names: Vec<String>,
    /// Self-FK column on the key table itself, for hierarchical key tables
    /// (e.g. `org(id, parent_id FK org.id)` used as the key table). Applied
    /// even when the database has no declared FK constraint on it, so a
    /// hierarchy expressed only by convention still closes under reverse
    /// pull.
    pub key_table_hierarchy_column_name: Option<String>,
    pub excluded_tables: HashSet<String>,
    pub generic_fk_tables: HashSet<String>,
    pub scratch_table_name: String,
    pub tables_limit_per_transaction: usize,
}

/// Reverse-engineers `pool`'s schema into a [`SchemaGraph`], following
/// §4.1: discover tables (minus partitions, the excluded set and the
/// scratch table), introspect columns in chunks bounded by
/// `tables_limit_per_transaction`, wire the FK graph, then populate
/// `full_count`/`max_pk` per table.
pub async fn introspect(
    pool: &Pool,
    sql: &Arc<dyn SqlProvider>,
    options: &IntrospectionOptions,
) -> Result<SchemaGraph, IntrospectionError> {
    let partitions = list_partitions(pool).await?;
    let mut table_names = list_tables(pool, sql, &options.schema_name).await?;
    table_names.retain(|name| {
        !partitions.contains(name)
            && !options.excluded_tables.contains(name)
            && name != &options.scratch_table_name
    });
    info!(count = table_names.len(), "discovered tables");

    let mut graph = SchemaGraph::new(
        options.key_table_name.clone(),
        options.key_column_names.clone(),
        options.excluded_tables.clone(),
        options.generic_fk_tables.clone(),
    );
    for name in &table_names {
        graph.insert_table(Table::new(name.clone()));
    }

    let known_tables: HashSet<String> = table_names.iter().cloned().collect();

    let chunk_size = options.tables_limit_per_transaction.max(1);
    let chunks: Vec<Vec<String>> = table_names
        .chunks(chunk_size)
        .map(<[String]>::to_vec)
        .collect();

    let column_batches = try_join_all(
        chunks
            .into_iter()
            .map(|chunk| introspect_columns_chunk(pool, sql, &options.schema_name, chunk)),
    )
    .await?;

    for batch in column_batches {
        for (table_name, column) in batch {
            if let Some(table) = graph.tables.get_mut(&table_name) {
                table.columns.push(column);
            }
        }
    }

    for table in graph.tables.values_mut() {
        table.columns.sort_by_key(|c| c.ordinal_position);
    }

    // Drop FK classification for columns referencing excluded tables
    // (§3 invariants: "FK edges pointing to excluded tables are dropped
    // silently"), and fail fatally for columns referencing a table that is
    // simply missing from the introspected schema.
    for table in graph.tables.values_mut() {
        for column in &mut table.columns {
            if !column.is_foreign_key() {
                continue;
            }
            let Some(referent) = column.constraint_table.clone() else {
                continue;
            };
            if options.excluded_tables.contains(&referent) {
                column.constraint_types.remove(&ConstraintType::ForeignKey);
                column.constraint_table = None;
            } else if !known_tables.contains(&referent) {
                return Err(IntrospectionError::UnknownForeignKeyTarget {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    referent,
                });
            }
        }
    }

    apply_key_table_hierarchy_column(&mut graph, options.key_table_hierarchy_column_name.as_deref());
    graph.wire_reverse_edges();
    populate_statistics(pool, sql, &options.schema_name, &mut graph).await?;

    Ok(graph)
}

/// Ensures `column_name` on the key table is classified as a foreign key
/// targeting the key table itself, regardless of what the database's own
/// constraint catalog says about it.
fn apply_key_table_hierarchy_column(graph: &mut SchemaGraph, column_name: Option<&str>) {
    let Some(column_name) = column_name else { return };
    let key_table_name = graph.key_table_name.clone();
    let Some(table) = graph.tables.get_mut(&key_table_name) else { return };
    let Some(column) = table.columns.iter_mut().find(|c| c.name == column_name) else { return };
    column.constraint_types.insert(ConstraintType::ForeignKey);
    column.constraint_table = Some(key_table_name);
}

async fn list_partitions(pool: &Pool) -> Result<HashSet<String>, IntrospectionError> {
    let client = pool.get().await.map_err(IntrospectionError::Pool)?;
    let rows = client
        .query("SELECT DISTINCT child.relname AS partition_name \
                FROM pg_inherits \
                JOIN pg_class child ON pg_inherits.inhrelid = child.oid", &[])
        .await
        .map_err(|source| IntrospectionError::Query { context: "list partitions".to_string(), source })?;
    Ok(rows.iter().map(|row| row.get("partition_name")).collect())
}

async fn list_tables(
    pool: &Pool,
    sql: &Arc<dyn SqlProvider>,
    schema_name: &str,
) -> Result<Vec<String>, IntrospectionError> {
    let client = pool.get().await.map_err(IntrospectionError::Pool)?;
    let query = sql.list_tables(schema_name)?;
    let rows = client
        .query(&query, &[])
        .await
        .map_err(|source| IntrospectionError::Query { context: "list tables".to_string(), source })?;
    Ok(rows.iter().map(|row| row.get("table_name")).collect())
}

async fn introspect_columns_chunk(
    pool: &Pool,
    sql: &Arc<dyn SqlProvider>,
    schema_name: &str,
    table_names: Vec<String>,
) -> Result<Vec<(String, Column)>, IntrospectionError> {
    let client = pool.get().await.map_err(IntrospectionError::Pool)?;
    let query = sql.introspect_columns(schema_name)?;
    let rows = client
        .query(&query, &[&table_names])
        .await
        .map_err(|source| IntrospectionError::Query { context: "introspect columns".to_string(), source })?;

    let mut by_column: HashMap<(String, String), (i32, String, HashSet<ConstraintType>, Option<String>)> =
        HashMap::new();

    for row in &rows {
        let table_name: String = row.get("table_name");
        let column_name: String = row.get("column_name");
        let ordinal: i32 = row.get("ordinal_position");
        let data_type: String = row.get("data_type");
        let constraint_type: String = row.get("constraint_type");
        let constraint_table: Option<String> = row.get("constraint_table");

        let entry = by_column
            .entry((table_name, column_name))
            .or_insert_with(|| (ordinal, data_type.clone(), HashSet::new(), None));
        match constraint_type.as_str() {
            "PRIMARY KEY" => {
                entry.2.insert(ConstraintType::PrimaryKey);
            }
            "FOREIGN KEY" => {
                entry.2.insert(ConstraintType::ForeignKey);
                entry.3 = constraint_table;
            }
            "UNIQUE" => {
                entry.2.insert(ConstraintType::Unique);
            }
            _ => {}
        }
    }

    Ok(by_column
        .into_iter()
        .map(|((table_name, column_name), (ordinal, data_type, constraint_types, constraint_table))| {
            (
                table_name,
                Column {
                    name: column_name,
                    ordinal_position: ordinal,
                    data_type,
                    constraint_types,
                    constraint_table,
                },
            )
        })
        .collect())
}

async fn populate_statistics(
    pool: &Pool,
    sql: &Arc<dyn SqlProvider>,
    schema_name: &str,
    graph: &mut SchemaGraph,
) -> Result<(), IntrospectionError> {
    let table_names: Vec<String> = graph.tables.keys().cloned().collect();
    let stats = try_join_all(table_names.into_iter().map(|name| {
        let pool = pool.clone();
        let sql = Arc::clone(sql);
        let schema_name = schema_name.to_string();
        async move {
            let client = pool.get().await.map_err(IntrospectionError::Pool)?;
            let count_query = sql.row_count(&schema_name, &name)?;
            let count_row = client
                .query_one(&count_query, &[])
                .await
                .map_err(|source| IntrospectionError::Query { context: format!("row count for {name}"), source })?;
            let full_count: i64 = count_row.get("count");
            Ok::<_, IntrospectionError>((name, full_count))
        }
    }))
    .await?;

    for (name, full_count) in stats {
        let Some(table) = graph.tables.get_mut(&name) else { continue };
        table.full_count = Some(full_count.max(0) as u64);

        let Some(pk) = table.primary_key().cloned() else {
            if table.has_date_typed_primary_key() {
                warn!(table = %name, "table has a date-typed primary key; unsupported, skipped for transfer");
            }
            continue;
        };

        let client = pool.get().await.map_err(IntrospectionError::Pool)?;
        let max_pk_query = sql.max_pk(schema_name, &name, &pk.name)?;
        let row = client
            .query_one(&max_pk_query, &[])
            .await
            .map_err(|source| IntrospectionError::Query { context: format!("max pk for {name}"), source })?;
        table.max_pk = row.get("max_pk");
    }

    Ok(())
}
