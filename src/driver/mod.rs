//! Driver shim: the public entry point wiring a compiled cache catalog and
//! schema to a real MySQL connection pool.

pub mod connection;
pub mod inner;
pub mod sqlx_inner;
pub mod statement;

pub use connection::CacheConnection;
pub use inner::InnerConnection;
pub use sqlx_inner::SqlxMySqlConnection;
pub use statement::CacheStatement;

use std::sync::Arc;

use sqlx::mysql::MySqlPoolOptions;

use crate::cache::CacheRegistry;
use crate::error::ConfigError;
use crate::plan::{CacheCatalog, SchemaCatalog};

/// The compiled, immutable state a running cache driver shares across every
/// connection it opens: the cache plan catalog, the schema it was compiled
/// against, and the live per-query caches.
pub struct CacheDriver {
    pub catalog: Arc<CacheCatalog>,
    pub schema: Arc<SchemaCatalog>,
    pub registry: Arc<CacheRegistry>,
}

impl CacheDriver {
    pub fn new(catalog: CacheCatalog, schema: SchemaCatalog) -> Self {
        let registry = Arc::new(CacheRegistry::from_catalog(&catalog));
        Self {
            catalog: Arc::new(catalog),
            schema: Arc::new(schema),
            registry,
        }
    }

    /// Open a pooled connection to `dsn` and wrap it in a [`CacheConnection`].
    pub async fn open(&self, dsn: &str) -> Result<Arc<CacheConnection<SqlxMySqlConnection>>, ConfigError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(|e| ConfigError::InvalidPlan(format!("failed to connect to {dsn}: {e}")))?;

        Ok(Arc::new(CacheConnection::new(
            SqlxMySqlConnection::new(pool),
            self.catalog.clone(),
            self.schema.clone(),
            self.registry.clone(),
        )))
    }
}
