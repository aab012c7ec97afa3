//! Introspection failures. Every variant here is fatal: the spec draws no
//! distinction between "retryable" and "fatal" at this layer, so there is no
//! retry here either.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntrospectionError {
    #[error("failed to acquire a connection from the pool")]
    Pool(#[source] deadpool_postgres::PoolError),

    #[error("introspection query failed: {context}")]
    Query {
        context: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("invalid identifier encountered while building an introspection query")]
    InvalidIdentifier(#[from] sql::InvalidIdentifier),

    /// An FK column's `constraint_table` was not found among the
    /// introspected tables and was not in the excluded set either — a
    /// schema inconsistency the spec calls out as fatal, with a full
    /// source chain rather than a silent skip.
    #[error("column {table}.{column} has a foreign key to unknown table {referent:?}")]
    UnknownForeignKeyTarget {
        table: String,
        column: String,
        referent: String,
    },
}
