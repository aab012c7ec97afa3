//! The orchestrator's top-level error: one enum over every crate-boundary
//! error, so `Manager::run` has a single `Result` the CLI can print and
//! exit non-zero on (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] model::ConfigError),

    #[error(transparent)]
    Introspection(#[from] schema::IntrospectionError),

    #[error(transparent)]
    Collection(#[from] collector::CollectorError),

    #[error(transparent)]
    Transfer(#[from] transport::TransportError),

    #[error("failed to build a connection pool for {side}: {source}")]
    PoolBuild {
        side: &'static str,
        #[source]
        source: deadpool_postgres::CreatePoolError,
    },

    #[error("failed to acquire a connection to {side}: {source}")]
    Pool {
        side: &'static str,
        #[source]
        source: deadpool_postgres::PoolError,
    },

    #[error("scratch-table setup/teardown failed: {0}")]
    Store(#[source] model::StoreError),

    #[error("failed to {action} on {side}: {source}")]
    Statement {
        action: &'static str,
        side: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("invalid identifier while preparing {action}: {source}")]
    InvalidIdentifier {
        action: &'static str,
        #[source]
        source: sql::InvalidIdentifier,
    },
}
