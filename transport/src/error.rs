//! Transfer failures. §4.4/§7: data-shape violations (missing column,
//! not-null violation, numeric out-of-range, syntax error) are wrapped with
//! table name and the offending SQL and raised fatal; no partial-commit
//! retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to acquire a destination connection")]
    Pool(#[source] deadpool_postgres::PoolError),

    #[error("invalid identifier while building a transfer query for table {table}")]
    InvalidIdentifier {
        table: String,
        #[source]
        source: sql::InvalidIdentifier,
    },

    #[error("working set error for table {table}: {source}")]
    Store {
        table: String,
        #[source]
        source: model::store_trait::StoreError,
    },

    /// A row-shape failure transferring `table`: missing column, NOT NULL
    /// violation, numeric range, or a syntax error from the dblink-rendered
    /// statement itself. Carries the statement for postmortem.
    #[error("transfer of table {table} failed: {source}\nstatement: {statement}")]
    DataShape {
        table: String,
        statement: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to advance the sequence for table {table}: {source}")]
    SequenceAdvance {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },
}
