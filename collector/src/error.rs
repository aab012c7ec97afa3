//! Collector failures. Like introspection, these are fatal: no retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to acquire a source connection")]
    Pool(#[source] deadpool_postgres::PoolError),

    #[error("collector query against {table} failed: {source}")]
    Query {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("invalid identifier while building a collector query")]
    InvalidIdentifier(#[from] sql::InvalidIdentifier),

    #[error("working set error for table {table}: {source}")]
    Store {
        table: String,
        #[source]
        source: model::store_trait::StoreError,
    },

    #[error("column conversion error for table {table}: {source}")]
    Value {
        table: String,
        #[source]
        source: store::PgValueError,
    },
}
