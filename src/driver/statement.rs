//! Prepared statement object.
//!
//! Caches the resolved [`QueryInfo`] at prepare time so repeated `exec`/
//! `query` calls on the same statement skip re-normalizing and re-looking-up
//! the plan.

use std::sync::Arc;

use crate::driver::connection::CacheConnection;
use crate::driver::inner::InnerConnection;
use crate::error::RouteError;
use crate::plan::QueryInfo;
use crate::rows::RowBuffer;
use crate::value::Value;

/// A statement prepared against a [`CacheConnection`]. Using it against any
/// other connection is a misuse the caller should never do; there's no way
/// to check that cheaply here, so it's simply not represented in the type.
pub struct CacheStatement<C: InnerConnection> {
    conn: Arc<CacheConnection<C>>,
    raw_query: String,
    query_info: Option<QueryInfo>,
}

impl<C: InnerConnection> CacheStatement<C> {
    pub(crate) fn new(
        conn: Arc<CacheConnection<C>>,
        raw_query: String,
        query_info: Option<QueryInfo>,
    ) -> Self {
        Self {
            conn,
            raw_query,
            query_info,
        }
    }

    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    /// Count of `?` placeholders in the normalized statement text. A
    /// multi-row `VALUES (?)`/`IN (?)` collapse means this is a lower bound
    /// rather than the exact argument count a caller must supply for a
    /// variadic statement — callers passing the wrong count for those
    /// surface it as a driver error from the underlying statement instead
    /// of from this count.
    pub fn num_input(&self) -> usize {
        crate::normalize::normalize_query(&self.raw_query)
            .bytes()
            .filter(|&b| b == b'?')
            .count()
    }

    pub async fn exec(&self, args: &[Value]) -> Result<u64, RouteError> {
        self.conn
            .route_exec(&self.raw_query, self.query_info.as_ref(), args)
            .await
    }

    pub async fn query(&self, args: &[Value]) -> Result<RowBuffer, RouteError> {
        self.conn
            .route_query(&self.raw_query, self.query_info.as_ref(), args)
            .await
    }

    /// Closing a prepared statement has nothing to release on this side;
    /// the underlying driver's statement handle (if any) lives inside
    /// `InnerConnection` and is reclaimed when that connection drops.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheRegistry;
    use crate::driver::connection::CacheConnection;
    use crate::error::DriverError;
    use crate::plan::{read_schema, CacheCatalog};
    use async_trait::async_trait;

    struct NoopInner;

    #[async_trait]
    impl InnerConnection for NoopInner {
        async fn query(&self, _query: &str, _args: &[Value]) -> Result<RowBuffer, DriverError> {
            Ok(RowBuffer::empty(vec![]))
        }
        async fn exec(&self, _query: &str, _args: &[Value]) -> Result<u64, DriverError> {
            Ok(0)
        }
        async fn begin(&self) -> Result<(), DriverError> {
            Ok(())
        }
        async fn commit(&self) -> Result<(), DriverError> {
            Ok(())
        }
        async fn rollback(&self) -> Result<(), DriverError> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[test]
    fn num_input_counts_placeholders_after_in_list_collapse() {
        let schema = read_schema(
            r#"CREATE TABLE users (
                id BIGINT NOT NULL,
                name VARCHAR(255) NOT NULL,
                PRIMARY KEY (id)
            ) ENGINE=InnoDB;"#,
        )
        .unwrap();
        let catalog = CacheCatalog::compile(&Default::default(), &schema).unwrap();
        let registry = std::sync::Arc::new(CacheRegistry::from_catalog(&catalog));
        let conn = std::sync::Arc::new(CacheConnection::new(
            NoopInner,
            std::sync::Arc::new(catalog),
            std::sync::Arc::new(schema),
            registry,
        ));

        let single = conn.prepare("UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(single.num_input(), 2);

        // IN (?, ?, ?, ?) collapses to IN (?) at normalization time, so the
        // count reflects the normalized placeholder, not the raw argument
        // count a caller must still bind.
        let fan_out = conn.prepare("SELECT * FROM users WHERE id IN (?, ?, ?, ?)");
        assert_eq!(fan_out.num_input(), 1);
    }
}
