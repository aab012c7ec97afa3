//! The only dialect this engine targets today.

use crate::identifier::{quote_ident, quote_qualified, InvalidIdentifier};
use crate::provider::{ColumnDef, SqlProvider};

/// Renders a value for inline embedding into a `dblink` remote-SQL literal.
///
/// Values come from a [`KeyValueStore`](model::KeyValueStore), which holds
/// primary keys as text regardless of their source column's real type
/// (integer, uuid, ...). A token made only of ASCII alphanumerics, `-` and
/// `_` (every integer and every canonical UUID) is embedded bare, so
/// Postgres's usual literal-to-column-type coercion applies; anything else
/// is quoted and its quotes doubled.
fn embed_value(value: &str) -> String {
    let is_bare_token = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if is_bare_token {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// A `SqlProvider` targeting plain PostgreSQL, using `dblink` for the
/// cross-database row transfer the transporter needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSqlProvider;

impl SqlProvider for PostgresSqlProvider {
    fn list_partitions(&self) -> String {
        "SELECT DISTINCT child.relname AS partition_name \
         FROM pg_inherits \
         JOIN pg_class child ON pg_inherits.inhrelid = child.oid \
         JOIN pg_class parent ON pg_inherits.inhparent = parent.oid"
            .to_string()
    }

    fn list_tables(&self, schema_name: &str) -> Result<String, InvalidIdentifier> {
        quote_ident(schema_name)?;
        Ok(format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = '{schema_name}' AND table_type = 'BASE TABLE'"
        ))
    }

    fn introspect_columns(&self, schema_name: &str) -> Result<String, InvalidIdentifier> {
        quote_ident(schema_name)?;
        Ok(format!(
            "SELECT c.table_name, c.column_name, c.ordinal_position, \
                    CASE WHEN c.data_type = 'ARRAY' THEN 'integer array' ELSE c.data_type END AS data_type, \
                    COALESCE(tc.constraint_type, '') AS constraint_type, \
                    ccu.table_name AS constraint_table \
             FROM information_schema.columns c \
             LEFT JOIN information_schema.key_column_usage kcu \
               ON kcu.table_schema = c.table_schema AND kcu.table_name = c.table_name \
               AND kcu.column_name = c.column_name \
             LEFT JOIN information_schema.table_constraints tc \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             LEFT JOIN information_schema.constraint_column_usage ccu \
               ON ccu.constraint_name = tc.constraint_name AND tc.constraint_type = 'FOREIGN KEY' \
             WHERE c.table_schema = '{schema_name}' AND c.table_name = ANY($1) \
             ORDER BY c.table_name, c.ordinal_position"
        ))
    }

    fn row_count(&self, schema_name: &str, table: &str) -> Result<String, InvalidIdentifier> {
        let qualified = quote_qualified(schema_name, table)?;
        Ok(format!("SELECT count(*) AS count FROM {qualified}"))
    }

    fn max_pk(&self, schema_name: &str, table: &str, pk_column: &str) -> Result<String, InvalidIdentifier> {
        let qualified = quote_qualified(schema_name, table)?;
        let pk = quote_ident(pk_column)?;
        Ok(format!("SELECT max({pk})::bigint AS max_pk FROM {qualified}"))
    }

    fn serial_sequence_name(
        &self,
        schema_name: &str,
        table: &str,
        pk_column: &str,
    ) -> Result<String, InvalidIdentifier> {
        let qualified = quote_qualified(schema_name, table)?;
        quote_ident(pk_column)?;
        Ok(format!(
            "SELECT pg_get_serial_sequence('{qualified}', '{pk_column}') AS sequence_name"
        ))
    }

    fn setval(&self) -> String {
        "SELECT setval($1::regclass, $2)".to_string()
    }

    fn truncate(&self, schema_name: &str, tables: &[String]) -> Result<String, InvalidIdentifier> {
        let qualified = tables
            .iter()
            .map(|t| quote_qualified(schema_name, t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("TRUNCATE TABLE {} CASCADE", qualified.join(", ")))
    }

    fn disable_triggers(&self, schema_name: &str, table: &str) -> Result<String, InvalidIdentifier> {
        let qualified = quote_qualified(schema_name, table)?;
        Ok(format!("ALTER TABLE {qualified} DISABLE TRIGGER ALL"))
    }

    fn enable_triggers(&self, schema_name: &str, table: &str) -> Result<String, InvalidIdentifier> {
        let qualified = quote_qualified(schema_name, table)?;
        Ok(format!("ALTER TABLE {qualified} ENABLE TRIGGER ALL"))
    }

    fn select_distinct_by_membership(
        &self,
        schema_name: &str,
        table: &str,
        select_column: &str,
        filter_column: &str,
    ) -> Result<String, InvalidIdentifier> {
        let qualified = quote_qualified(schema_name, table)?;
        let select = quote_ident(select_column)?;
        let filter = quote_ident(filter_column)?;
        // `filter` is cast to text so the bound `$1` (always a text[] of the
        // working set's string-keyed values) compares against any real
        // column type — integer, uuid, text — without the caller needing to
        // know it.
        Ok(format!(
            "SELECT DISTINCT {select} FROM {qualified} WHERE {filter}::text = ANY($1) AND {select} IS NOT NULL"
        ))
    }

    fn select_all(&self, schema_name: &str, table: &str, pk_column: &str) -> Result<String, InvalidIdentifier> {
        let qualified = quote_qualified(schema_name, table)?;
        let pk = quote_ident(pk_column)?;
        Ok(format!("SELECT {pk} FROM {qualified}"))
    }

    fn transfer_chunk(
        &self,
        schema_name: &str,
        table: &str,
        columns: &[ColumnDef],
        pk_column: &str,
        src_connection_string: &str,
        pk_values: &[String],
    ) -> Result<String, InvalidIdentifier> {
        let qualified = quote_qualified(schema_name, table)?;
        let pk = quote_ident(pk_column)?;

        let mut col_names = Vec::with_capacity(columns.len());
        let mut col_defs = Vec::with_capacity(columns.len());
        for column in columns {
            let quoted = quote_ident(&column.name)?;
            col_defs.push(format!("{quoted} {}", column.data_type));
            col_names.push(quoted);
        }
        let col_list = col_names.join(", ");
        let col_defs = col_defs.join(", ");

        let values_sql = pk_values.iter().map(|v| embed_value(v)).collect::<Vec<_>>().join(", ");
        let remote_sql = format!("SELECT {col_list} FROM {qualified} WHERE {pk} = ANY(ARRAY[{values_sql}])");
        let remote_sql_escaped = remote_sql.replace('\'', "''");
        let conn_escaped = src_connection_string.replace('\'', "''");

        Ok(format!(
            "INSERT INTO {qualified} ({col_list}) \
             SELECT {col_list} FROM dblink('{conn_escaped}', '{remote_sql_escaped}') AS t({col_defs}) \
             ON CONFLICT DO NOTHING RETURNING {pk}"
        ))
    }

    fn create_scratch_table(&self, table_name: &str) -> Result<String, InvalidIdentifier> {
        let quoted = quote_ident(table_name)?;
        Ok(format!(
            "DROP TABLE IF EXISTS {quoted}; \
             CREATE TABLE {quoted} (group_id INTEGER NOT NULL, data VARCHAR(255) NOT NULL, \
             UNIQUE(group_id, data)); \
             CREATE INDEX ON {quoted} (group_id)"
        ))
    }

    fn drop_scratch_table(&self, table_name: &str) -> Result<String, InvalidIdentifier> {
        let quoted = quote_ident(table_name)?;
        Ok(format!("DROP TABLE IF EXISTS {quoted}"))
    }

    fn scratch_insert(&self, table_name: &str) -> Result<String, InvalidIdentifier> {
        let quoted = quote_ident(table_name)?;
        Ok(format!(
            "INSERT INTO {quoted} (group_id, data) VALUES ($1, $2) ON CONFLICT (group_id, data) DO NOTHING"
        ))
    }

    fn scratch_page(&self, table_name: &str) -> Result<String, InvalidIdentifier> {
        let quoted = quote_ident(table_name)?;
        Ok(format!(
            "SELECT data FROM {quoted} WHERE group_id = $1 ORDER BY data LIMIT $2 OFFSET $3"
        ))
    }

    fn scratch_count(&self, table_name: &str) -> Result<String, InvalidIdentifier> {
        let quoted = quote_ident(table_name)?;
        Ok(format!("SELECT count(*) AS count FROM {quoted} WHERE group_id = $1"))
    }

    fn scratch_difference_page(&self, table_name: &str) -> Result<String, InvalidIdentifier> {
        let quoted = quote_ident(table_name)?;
        Ok(format!(
            "SELECT data FROM {quoted} a WHERE a.group_id = $1 \
             AND NOT EXISTS (SELECT 1 FROM {quoted} b WHERE b.group_id = $2 AND b.data = a.data) \
             ORDER BY a.data LIMIT $3 OFFSET $4"
        ))
    }

    fn scratch_delete_group(&self, table_name: &str) -> Result<String, InvalidIdentifier> {
        let quoted = quote_ident(table_name)?;
        Ok(format!("DELETE FROM {quoted} WHERE group_id = $1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_integer_tokens_bare() {
        assert_eq!(embed_value("42"), "42");
    }

    #[test]
    fn embeds_uuid_tokens_bare() {
        assert_eq!(embed_value("3fa85f64-5717-4562-b3fc-2c963f66afa6"), "3fa85f64-5717-4562-b3fc-2c963f66afa6");
    }

    #[test]
    fn quotes_and_escapes_everything_else() {
        assert_eq!(embed_value("o'brien"), "'o''brien'");
    }

    #[test]
    fn transfer_chunk_embeds_values_and_types() {
        let provider = PostgresSqlProvider;
        let sql = provider
            .transfer_chunk(
                "public",
                "accounts",
                &[
                    ColumnDef { name: "id".into(), data_type: "integer".into() },
                    ColumnDef { name: "name".into(), data_type: "text".into() },
                ],
                "id",
                "host=localhost dbname=src",
                &["1".to_string(), "2".to_string()],
            )
            .unwrap();
        assert!(sql.contains("ANY(ARRAY[1, 2])"));
        assert!(sql.contains("dblink"));
        assert!(sql.contains("ON CONFLICT DO NOTHING RETURNING \"id\""));
    }

    #[test]
    fn rejects_identifiers_with_quotes() {
        let provider = PostgresSqlProvider;
        assert!(provider.row_count("public", "a\"; drop table b; --").is_err());
    }

    #[test]
    fn truncate_joins_multiple_qualified_tables() {
        let provider = PostgresSqlProvider;
        let sql = provider
            .truncate("public", &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(sql, "TRUNCATE TABLE \"public\".\"a\", \"public\".\"b\" CASCADE");
    }
}
