//! The `SqlProvider` trait: a pure function surface from structured inputs to
//! query strings. Nothing in this crate ever opens a connection; `schema` and
//! `transport` hold a `Box<dyn SqlProvider>` and execute what it returns.

use crate::identifier::InvalidIdentifier;

/// One column of an introspected table, as needed to render a cross-database
/// transfer statement (name + source data type, used in the `dblink` result
/// row description).
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

pub trait SqlProvider: Send + Sync {
    /// Lists child partitions, so `schema`'s table discovery can exclude
    /// them — a partition inherits its parent's data and must never be
    /// transferred as an independent table.
    fn list_partitions(&self) -> String;

    /// Lists base table names in `schema_name`, excluding views and the
    /// scratch store table itself.
    fn list_tables(&self, schema_name: &str) -> Result<String, InvalidIdentifier>;

    /// Introspects columns and their constraints for up to
    /// `TABLES_LIMIT_PER_TRANSACTION` tables at once. The query binds the
    /// table name list as `$1` (a `text[]`) rather than interpolating it,
    /// since the list itself is not a SQL identifier.
    fn introspect_columns(&self, schema_name: &str) -> Result<String, InvalidIdentifier>;

    fn row_count(&self, schema_name: &str, table: &str) -> Result<String, InvalidIdentifier>;

    fn max_pk(&self, schema_name: &str, table: &str, pk_column: &str) -> Result<String, InvalidIdentifier>;

    /// `pg_get_serial_sequence`-based lookup of the sequence backing
    /// `pk_column`, or NULL when the column is not sequence-backed.
    fn serial_sequence_name(
        &self,
        schema_name: &str,
        table: &str,
        pk_column: &str,
    ) -> Result<String, InvalidIdentifier>;

    /// `setval` against a sequence name bound as `$1`, with target value
    /// bound as `$2`.
    fn setval(&self) -> String;

    fn truncate(&self, schema_name: &str, tables: &[String]) -> Result<String, InvalidIdentifier>;

    fn disable_triggers(&self, schema_name: &str, table: &str) -> Result<String, InvalidIdentifier>;

    fn enable_triggers(&self, schema_name: &str, table: &str) -> Result<String, InvalidIdentifier>;

    /// Selects `select_column` (DISTINCT, non-null) for every row of `table`
    /// whose `filter_column` is in the caller-bound `$1` array. Used by the
    /// collector for both the forward pull (select the referent key) and the
    /// reverse pull (select the referencing row's own key).
    fn select_distinct_by_membership(
        &self,
        schema_name: &str,
        table: &str,
        select_column: &str,
        filter_column: &str,
    ) -> Result<String, InvalidIdentifier>;

    /// Selects every value of `pk_column` in `table` — used to seed
    /// `FULL_TRANSFER_TABLES`.
    fn select_all(&self, schema_name: &str, table: &str, pk_column: &str) -> Result<String, InvalidIdentifier>;

    /// Renders one chunk transfer: pulls the rows of `table` whose
    /// `pk_column` is in `pk_values` from the source (reached over
    /// `src_connection_string` via `dblink`) and inserts them into the
    /// destination, ignoring rows that already exist, returning the
    /// inserted primary keys.
    fn transfer_chunk(
        &self,
        schema_name: &str,
        table: &str,
        columns: &[ColumnDef],
        pk_column: &str,
        src_connection_string: &str,
        pk_values: &[String],
    ) -> Result<String, InvalidIdentifier>;

    fn create_scratch_table(&self, table_name: &str) -> Result<String, InvalidIdentifier>;

    fn drop_scratch_table(&self, table_name: &str) -> Result<String, InvalidIdentifier>;

    /// `INSERT ... ON CONFLICT (group_id, data) DO NOTHING`, binding
    /// `group_id` as `$1` and `data` as `$2`.
    fn scratch_insert(&self, table_name: &str) -> Result<String, InvalidIdentifier>;

    /// One `LIMIT`/`OFFSET` page of `group_id`'s values, ordered by `data`.
    /// Binds `group_id` as `$1`, `LIMIT` as `$2`, `OFFSET` as `$3`.
    fn scratch_page(&self, table_name: &str) -> Result<String, InvalidIdentifier>;

    fn scratch_count(&self, table_name: &str) -> Result<String, InvalidIdentifier>;

    /// One page of values present in `group_id` ($1) but absent from
    /// `other_group_id` ($2), ordered by `data`, bounded by `LIMIT`/`OFFSET`
    /// ($3/$4).
    fn scratch_difference_page(&self, table_name: &str) -> Result<String, InvalidIdentifier>;

    fn scratch_delete_group(&self, table_name: &str) -> Result<String, InvalidIdentifier>;
}
