//! Crate-wide error taxonomy, split into three buckets: malformed setup
//! (`ConfigError`), failures surfaced by the wrapped driver (`DriverError`),
//! and statement-routing failures the shim itself can raise (`RouteError`).

use thiserror::Error;

use crate::rows::RowBuffer;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cache plan document is malformed: {0}")]
    InvalidPlan(String),

    #[error("schema DDL contained no recognizable CREATE TABLE statements")]
    EmptySchema,

    #[error("cache plan references unknown table {0:?}")]
    UnknownTable(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cache plan yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failures bubbled up unchanged from the underlying MySQL-compatible
/// driver. The shim never inspects these beyond passing them through.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("underlying driver error: {0}")]
    Underlying(#[from] sqlx::Error),

    #[error("operation canceled")]
    Canceled,

    /// Not a real failure: a cell outside the closed `Value` scalar set
    /// showed up in the result. The rows travel back to the caller inside
    /// this variant; the per-query cache's `try_get_with` treats any `Err`
    /// as "don't store", which is exactly the behavior this case needs.
    #[error("row set is not representable in the cacheable value set")]
    Uncacheable(Box<RowBuffer>),
}

/// Failures the routing layer itself can raise before ever reaching the
/// inner driver.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("statement is not part of the configured cache plan: {0:?}")]
    UnknownQuery(String),

    #[error("attempted to use a statement outside its originating connection")]
    StatementMisuse,
}
