//! Routing logic: the part of the driver shim that decides, for every
//! statement, whether to serve cache, fan out an `IN` list, or delegate
//! straight through — and feeds writes to the invalidation engine and
//! transaction guard.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::cache::CacheRegistry;
use crate::clock::now_ns;
use crate::driver::inner::InnerConnection;
use crate::driver::statement::CacheStatement;
use crate::error::{DriverError, RouteError};
use crate::invalidate::{compute_delete_cleanup, compute_insert_cleanup, compute_update_cleanup, purge_all};
use crate::key::encode_key;
use crate::normalize::normalize_query;
use crate::plan::{CacheCatalog, Operator, QueryInfo, SchemaCatalog};
use crate::rows::RowBuffer;
use crate::txn::TransactionGuard;
use crate::value::Value;

/// One logical connection: an inner driver connection plus the cache
/// routing state layered on top of it. Exclusively owned by whichever
/// caller currently holds it.
pub struct CacheConnection<C: InnerConnection> {
    inner: C,
    catalog: Arc<CacheCatalog>,
    schema: Arc<SchemaCatalog>,
    registry: Arc<CacheRegistry>,
    txn: Mutex<TransactionGuard>,
    /// Nanosecond timestamp of the last "unknown mutating query" warning, so
    /// a burst of the same unrecognized statement logs once per window
    /// instead of once per call.
    last_unknown_query_warn_ns: AtomicI64,
}

const UNKNOWN_QUERY_WARN_WINDOW_NS: i64 = 5_000_000_000;

impl<C: InnerConnection> CacheConnection<C> {
    pub fn new(
        inner: C,
        catalog: Arc<CacheCatalog>,
        schema: Arc<SchemaCatalog>,
        registry: Arc<CacheRegistry>,
    ) -> Self {
        Self {
            inner,
            catalog,
            schema,
            registry,
            txn: Mutex::new(TransactionGuard::new()),
            last_unknown_query_warn_ns: AtomicI64::new(0),
        }
    }

    pub async fn ping(&self) -> Result<(), DriverError> {
        self.inner.ping().await
    }

    /// `Idle -> InTx`.
    pub async fn begin(&self) -> Result<(), DriverError> {
        self.inner.begin().await?;
        self.txn.lock().await.begin(now_ns());
        Ok(())
    }

    /// `InTx -> Idle`, applying every deferred purge/forget.
    pub async fn commit(&self) -> Result<(), DriverError> {
        self.inner.commit().await?;
        self.txn.lock().await.commit(now_ns());
        Ok(())
    }

    /// `InTx -> Idle`, dropping deferred cleanup work untouched.
    pub async fn rollback(&self) -> Result<(), DriverError> {
        self.inner.rollback().await?;
        self.txn.lock().await.rollback();
        Ok(())
    }

    /// Prepare a statement, resolving its plan entry once so repeated
    /// `exec`/`query` calls on it skip normalization and catalog lookup.
    pub fn prepare(self: &Arc<Self>, raw_query: &str) -> CacheStatement<C> {
        let query_info = self.catalog.lookup(raw_query).cloned();
        CacheStatement::new(self.clone(), raw_query.to_string(), query_info)
    }

    pub async fn exec(&self, raw_query: &str, args: &[Value]) -> Result<u64, RouteError> {
        let query_info = self.catalog.lookup(raw_query).cloned();
        self.route_exec(raw_query, query_info.as_ref(), args).await
    }

    pub async fn query(&self, raw_query: &str, args: &[Value]) -> Result<RowBuffer, RouteError> {
        let query_info = self.catalog.lookup(raw_query).cloned();
        self.route_query(raw_query, query_info.as_ref(), args).await
    }

    pub(crate) async fn route_exec(
        &self,
        raw_query: &str,
        query_info: Option<&QueryInfo>,
        args: &[Value],
    ) -> Result<u64, RouteError> {
        let task = match query_info {
            None => {
                let normalized = normalize_query(raw_query);
                if is_select(&normalized) {
                    None
                } else {
                    self.warn_unknown_query_rate_limited(&normalized);
                    Some(purge_all(&self.registry))
                }
            }
            Some(QueryInfo::Insert(insert)) => {
                Some(compute_insert_cleanup(&self.registry, insert, args))
            }
            Some(QueryInfo::Update(update)) => Some(compute_update_cleanup(
                &self.registry,
                update,
                args,
                &self.schema,
            )),
            Some(QueryInfo::Delete(delete)) => Some(compute_delete_cleanup(
                &self.registry,
                delete,
                args,
                &self.schema,
            )),
            Some(QueryInfo::Select(_)) => None,
        };

        let result = self.inner.exec(raw_query, args).await;

        if let Some(task) = task {
            if !task.is_empty() {
                self.txn.lock().await.handle_write(task, now_ns());
            }
        }

        Ok(result?)
    }

    pub(crate) async fn route_query(
        &self,
        raw_query: &str,
        query_info: Option<&QueryInfo>,
        args: &[Value],
    ) -> Result<RowBuffer, RouteError> {
        let select = match query_info {
            Some(QueryInfo::Select(select)) if select.cache => select,
            _ => return Ok(self.inner.query(raw_query, args).await?),
        };

        if raw_query.to_ascii_uppercase().contains("FOR UPDATE") {
            return Ok(self.inner.query(raw_query, args).await?);
        }

        if let [condition] = select.conditions.as_slice() {
            if condition.operator == Operator::In {
                return self
                    .query_in_fan_out(raw_query, select.table.as_deref(), condition, args)
                    .await;
            }
        }

        let Some(entry) = self.registry.entry_for_query(raw_query) else {
            return Ok(self.inner.query(raw_query, args).await?);
        };
        let key = encode_key(args);

        {
            let guard = self.txn.lock().await;
            if guard.must_bypass_cache(&entry, &key) {
                drop(guard);
                return Ok(self.inner.query(raw_query, args).await?);
            }
        }

        let owned_query = raw_query.to_string();
        let owned_args = args.to_vec();
        let inner = &self.inner;
        let rows = entry
            .get_with(key, || async move {
                let rows = inner.query(&owned_query, &owned_args).await?;
                if rows.is_cacheable() {
                    Ok(rows)
                } else {
                    Err(DriverError::Uncacheable(Box::new(rows)))
                }
            })
            .await?;
        Ok(rows)
    }

    /// Rate-limit the "unknown mutating query" warning so a burst of the
    /// same unrecognized statement logs once per window instead of once per
    /// call.
    fn warn_unknown_query_rate_limited(&self, normalized_query: &str) {
        let now = now_ns();
        let last = self.last_unknown_query_warn_ns.load(Ordering::Relaxed);
        if now - last < UNKNOWN_QUERY_WARN_WINDOW_NS {
            return;
        }
        if self
            .last_unknown_query_warn_ns
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            warn!(query = %normalized_query, "unknown mutating query, purging every cache");
        }
    }

    /// `SELECT ... WHERE c IN (?)`: split into one single-key lookup per
    /// value against the sibling `c = ?` cache, and merge the results. Row
    /// order across the split is not preserved. When there is no table to
    /// look a sibling up against, or no sibling `c = ?` cache exists, the
    /// query is still perfectly valid SQL — delegate straight through
    /// rather than surfacing an error for something the inner driver can
    /// answer directly.
    async fn query_in_fan_out(
        &self,
        raw_query: &str,
        table: Option<&str>,
        condition: &crate::plan::Condition,
        args: &[Value],
    ) -> Result<RowBuffer, RouteError> {
        let Some(table) = table else {
            return Ok(self.inner.query(raw_query, args).await?);
        };
        let sibling = self
            .registry
            .entries_for_table(table)
            .iter()
            .find(|c| matches!(c.single_eq_condition(), Some(c2) if c2.column == condition.column));

        let Some(sibling) = sibling else {
            // No EQ sibling to fan out against; nothing to cache with.
            return Ok(self.inner.query(raw_query, args).await?);
        };

        let start = condition.placeholder.map(|p| p.index).unwrap_or(0);
        let values = args.get(start..).unwrap_or(&[]);

        let mut buffers = Vec::with_capacity(values.len());
        for value in values {
            let key = encode_key(std::slice::from_ref(value));
            {
                let guard = self.txn.lock().await;
                if guard.must_bypass_cache(sibling, &key) {
                    drop(guard);
                    let rows = self
                        .inner
                        .query(&sibling.query, std::slice::from_ref(value))
                        .await?;
                    buffers.push(rows);
                    continue;
                }
            }
            let owned_query = sibling.query.clone();
            let owned_value = value.clone();
            let inner = &self.inner;
            let rows = sibling
                .get_with(key, || async move {
                    let rows = inner.query(&owned_query, std::slice::from_ref(&owned_value)).await?;
                    if rows.is_cacheable() {
                        Ok(rows)
                    } else {
                        Err(DriverError::Uncacheable(Box::new(rows)))
                    }
                })
                .await?;
            buffers.push(rows);
        }

        Ok(RowBuffer::merge(buffers).unwrap_or_else(|| RowBuffer::empty(Vec::new())))
    }
}

fn is_select(normalized_query: &str) -> bool {
    normalized_query.trim_start().to_ascii_uppercase().starts_with("SELECT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{parse_plan, read_schema, CacheCatalog};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    const SCHEMA: &str = r#"CREATE TABLE users (
        id BIGINT NOT NULL,
        name VARCHAR(255) NOT NULL,
        PRIMARY KEY (id)
    ) ENGINE=InnoDB;"#;

    const PLAN: &str = r#"
queries:
  - query: "SELECT * FROM users WHERE id = ?"
    type: select
    table: users
    cache: true
    targets: [id, name]
    conditions:
      - column: id
        operator: eq
        placeholder: { index: 0 }
  - query: "UPDATE users SET name = ? WHERE id = ?"
    type: update
    table: users
    targets:
      - column: name
        placeholder: { index: 0 }
    conditions:
      - column: id
        operator: eq
        placeholder: { index: 1 }
  - query: "SELECT * FROM users WHERE name IN (?)"
    type: select
    table: users
    cache: true
    targets: [id, name]
    conditions:
      - column: name
        operator: in
        placeholder: { index: 0 }
"#;

    struct CountingInner {
        queries: AtomicU64,
    }

    #[async_trait]
    impl InnerConnection for CountingInner {
        async fn query(&self, _query: &str, _args: &[Value]) -> Result<RowBuffer, DriverError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(RowBuffer::new(
                vec!["id".into(), "name".into()],
                vec![vec![Value::Int64(1), Value::Text("orig".into())]],
            ))
        }
        async fn exec(&self, _query: &str, _args: &[Value]) -> Result<u64, DriverError> {
            Ok(1)
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

    fn conn() -> CacheConnection<CountingInner> {
        let schema = read_schema(SCHEMA).unwrap();
        let plan = parse_plan(PLAN).unwrap();
        let catalog = CacheCatalog::compile(&plan, &schema).unwrap();
        let registry = Arc::new(CacheRegistry::from_catalog(&catalog));
        CacheConnection::new(
            CountingInner {
                queries: AtomicU64::new(0),
            },
            Arc::new(catalog),
            Arc::new(schema),
            registry,
        )
    }

    #[tokio::test]
    async fn second_identical_select_hits_cache() {
        let conn = conn();
        let q = "SELECT * FROM `users` WHERE `id` = ?";
        conn.query(q, &[Value::Int64(1)]).await.unwrap();
        conn.query(q, &[Value::Int64(1)]).await.unwrap();
        assert_eq!(conn.inner.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn update_forgets_key_so_next_select_misses() {
        let conn = conn();
        let q = "SELECT * FROM `users` WHERE `id` = ?";
        conn.query(q, &[Value::Int64(1)]).await.unwrap();
        conn.exec(
            "UPDATE `users` SET `name` = ? WHERE `id` = ?",
            &[Value::Text("X".into()), Value::Int64(1)],
        )
        .await
        .unwrap();
        conn.query(q, &[Value::Int64(1)]).await.unwrap();
        assert_eq!(conn.inner.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn in_tx_update_is_invisible_to_concurrent_reader_until_commit() {
        let conn = conn();
        let q = "SELECT * FROM `users` WHERE `id` = ?";
        conn.query(q, &[Value::Int64(1)]).await.unwrap();

        conn.begin().await.unwrap();
        conn.exec(
            "UPDATE `users` SET `name` = ? WHERE `id` = ?",
            &[Value::Text("X".into()), Value::Int64(1)],
        )
        .await
        .unwrap();

        // the same connection, still inside its own tx, must see fresh data
        conn.query(q, &[Value::Int64(1)]).await.unwrap();
        assert_eq!(conn.inner.queries.load(Ordering::SeqCst), 2);

        conn.commit().await.unwrap();

        conn.query(q, &[Value::Int64(1)]).await.unwrap();
        assert_eq!(conn.inner.queries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn in_query_without_sibling_eq_cache_delegates_instead_of_erroring() {
        let conn = conn();
        let q = "SELECT * FROM `users` WHERE `name` IN (?, ?)";
        let result = conn
            .query(q, &[Value::Text("a".into()), Value::Text("b".into())])
            .await;
        assert!(result.is_ok());
        assert_eq!(conn.inner.queries.load(Ordering::SeqCst), 1);
    }
}
