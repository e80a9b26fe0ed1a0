//! Per-query cache: a bounded, keyed store with TTL/idle eviction and
//! built-in per-key load deduplication.
//!
//! The bookkeeping here (lastUpdate/lastUpdateByKey/replaceTime-style
//! atomics and an `is_newer_than` freshness check) wraps `moka`'s cache
//! primitive, whose `try_get_with` gives the requirement that at most one
//! inner-driver call per key is ever in flight for free — concurrent
//! callers for the same key share the one in-flight load.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use moka::future::Cache;

use crate::error::DriverError;
use crate::plan::Condition;
use crate::rows::RowBuffer;

/// Default bound on distinct keys held per cached query.
pub const DEFAULT_MAX_CAPACITY: u64 = 1000;
/// Default TTL and idle-eviction window: roughly 10 minutes each.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// One cached `SELECT` query's table of key -> row-buffer entries, plus the
/// freshness bookkeeping the transaction guard needs.
pub struct CacheEntry {
    pub query: String,
    pub unique_only: bool,
    /// The `WHERE` conditions this query's plan entry declared; the
    /// invalidation engine uses these to decide whether a write can be
    /// narrowed to a single key instead of purging the whole entry.
    pub conditions: Vec<Condition>,
    /// Columns this `SELECT` projects; an `UPDATE` whose `SET` touches none
    /// of these never needs to invalidate this entry.
    pub target_columns: Vec<String>,
    store: Cache<String, RowBuffer>,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Count of loads for a key this cache has already served before — it
    /// was evicted, purged, or forgotten and is now being refetched — as
    /// opposed to the first-ever load of a brand-new key. Tracked via
    /// `seen_keys` rather than derived from `misses`, since every miss that
    /// isn't a replacement is a first load, and the two need to stay
    /// independently observable per spec.
    replacements: AtomicU64,
    replace_time_ns: AtomicU64,
    /// Last time this whole query was purged, as nanoseconds since
    /// `UNIX_EPOCH`. Compared against a transaction's start time to decide
    /// whether a read inside that transaction may trust the cache.
    last_purge_ns: AtomicI64,
    /// Last time an individual key was forgotten, same clock.
    last_forget_ns: DashMap<String, i64>,
    /// Every key this cache has ever successfully loaded at least once,
    /// independent of whether it is still resident. Used only to tell a
    /// first-ever load apart from a replacement load.
    seen_keys: DashMap<String, ()>,
}

impl CacheEntry {
    pub fn new(
        query: String,
        unique_only: bool,
        conditions: Vec<Condition>,
        target_columns: Vec<String>,
    ) -> Self {
        Self::with_config(
            query,
            unique_only,
            conditions,
            target_columns,
            DEFAULT_MAX_CAPACITY,
            DEFAULT_TTL,
        )
    }

    pub fn with_config(
        query: String,
        unique_only: bool,
        conditions: Vec<Condition>,
        target_columns: Vec<String>,
        max_capacity: u64,
        ttl: Duration,
    ) -> Self {
        Self {
            query,
            unique_only,
            conditions,
            target_columns,
            store: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .time_to_idle(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            replacements: AtomicU64::new(0),
            replace_time_ns: AtomicU64::new(0),
            last_purge_ns: AtomicI64::new(0),
            last_forget_ns: DashMap::new(),
            seen_keys: DashMap::new(),
        }
    }

    /// The single EQ condition this entry is keyed by, if it has exactly
    /// one condition of that shape (regardless of `unique_only` — a cache
    /// can have one EQ condition on a non-unique column, e.g. `group_id`).
    ///
    /// A condition pinned to a literal rather than a real placeholder
    /// (`placeholder == None`) is excluded: it can never be satisfied by an
    /// argument, so callers fall back to a whole-cache purge instead of
    /// guessing a key.
    pub fn single_eq_condition(&self) -> Option<&Condition> {
        match self.conditions.as_slice() {
            [only] if only.operator == crate::plan::Operator::Eq && only.placeholder.is_some() => {
                Some(only)
            }
            _ => None,
        }
    }

    /// Fetch `key`, invoking `loader` on a miss. Concurrent calls for the
    /// same key share a single in-flight `loader` invocation.
    pub async fn get_with<F, Fut>(&self, key: String, loader: F) -> Result<RowBuffer, DriverError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<RowBuffer, DriverError>>,
    {
        let was_present = self.store.contains_key(&key);
        let started = std::time::Instant::now();
        let loaded_key = key.clone();

        let result = self
            .store
            .try_get_with(key, async move { loader().await })
            .await;

        match result {
            Ok(rows) => {
                if was_present {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    self.replace_time_ns
                        .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
                    // A replacement is a reload of a key this cache has
                    // already served before (evicted, purged, or forgotten
                    // and now refetched); the first-ever load of a key is a
                    // plain miss, not a replacement.
                    if self.seen_keys.insert(loaded_key, ()).is_some() {
                        self.replacements.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Ok(rows)
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.replace_time_ns
                    .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
                // Arc<DriverError> isn't DriverError; loaders here only ever
                // produce DriverError, so unwrap the shared failure by
                // reconstructing a plain variant for the caller. `moka`
                // never stores a value on `Err`, which is exactly what an
                // uncacheable row set needs — so it surfaces here as a
                // successful result instead of propagating the error.
                match &*e {
                    DriverError::Canceled => Err(DriverError::Canceled),
                    DriverError::Underlying(err) => Err(DriverError::Underlying(sqlx_error_clone(err))),
                    DriverError::Uncacheable(rows) => Ok((**rows).clone()),
                }
            }
        }
    }

    /// Purge every key belonging to this query (a non-unique-only write
    /// touched it, or the write couldn't be narrowed to one key).
    pub fn purge_all(&self, now_ns: i64) {
        self.store.invalidate_all();
        self.last_purge_ns.store(now_ns, Ordering::Relaxed);
    }

    /// Purge a single key (a unique-only write narrowed to exactly one row).
    pub fn forget(&self, key: &str, now_ns: i64) {
        self.store.invalidate(key);
        self.last_forget_ns.insert(key.to_string(), now_ns);
    }

    /// Record that this entry *would* have been purged, without evicting
    /// anything yet: a write deferred inside a transaction still moves the
    /// freshness timestamp so concurrent in-tx reads bypass the cache, but
    /// the actual eviction waits for commit.
    pub fn mark_purged(&self, now_ns: i64) {
        self.last_purge_ns.store(now_ns, Ordering::Relaxed);
    }

    /// Record that `key` *would* have been forgotten, without evicting it
    /// yet; see [`Self::mark_purged`].
    pub fn mark_forgotten(&self, key: &str, now_ns: i64) {
        self.last_forget_ns.insert(key.to_string(), now_ns);
    }

    /// Whether this entry has been purged or had `key` forgotten more
    /// recently than `since` — the freshness check the transaction guard
    /// uses to decide whether a read may trust the cache.
    pub fn is_newer_than(&self, key: &str, since: i64) -> bool {
        if self.last_purge_ns.load(Ordering::Relaxed) > since {
            return true;
        }
        self.last_forget_ns
            .get(key)
            .map(|t| *t > since)
            .unwrap_or(false)
    }

    pub fn stats(&self) -> CacheEntryStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheEntryStats {
            query: self.query.clone(),
            hits,
            misses,
            hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
            replacements: self.replacements.load(Ordering::Relaxed),
            replace_time_ns: self.replace_time_ns.load(Ordering::Relaxed),
            entry_count: self.store.entry_count(),
        }
    }
}

fn sqlx_error_clone(e: &sqlx::Error) -> sqlx::Error {
    // sqlx::Error isn't Clone; the shim only needs enough fidelity to
    // report the failure, so its Display text is carried forward instead.
    sqlx::Error::Protocol(e.to_string())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheEntryStats {
    pub query: String,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub replacements: u64,
    pub replace_time_ns: u64,
    pub entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf() -> RowBuffer {
        RowBuffer::new(vec!["id".into()], vec![vec![crate::value::Value::Int64(1)]])
    }

    #[tokio::test]
    async fn miss_then_hit_counts_correctly() {
        let entry = CacheEntry::new("SELECT * FROM t WHERE id = ?;".into(), true, vec![], vec![]);
        entry.get_with("k".into(), || async { Ok(buf()) }).await.unwrap();
        entry.get_with("k".into(), || async { Ok(buf()) }).await.unwrap();

        let stats = entry.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        // first-ever load of "k" is a plain miss, not a replacement.
        assert_eq!(stats.replacements, 0);
    }

    #[tokio::test]
    async fn forget_evicts_only_that_key() {
        let entry = CacheEntry::new("SELECT * FROM t WHERE id = ?;".into(), true, vec![], vec![]);
        entry.get_with("a".into(), || async { Ok(buf()) }).await.unwrap();
        entry.get_with("b".into(), || async { Ok(buf()) }).await.unwrap();

        entry.forget("a", 1);
        entry.get_with("a".into(), || async { Ok(buf()) }).await.unwrap();
        entry.get_with("b".into(), || async { Ok(buf()) }).await.unwrap();

        let stats = entry.stats();
        // "a" missed twice (forgotten then reloaded), "b" missed once then hit.
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.hits, 1);
        // only "a"'s second load is a replacement: "b" was never seen before
        // its one and only load, and "a"'s first load was a plain miss too.
        assert_eq!(stats.replacements, 1);
    }

    #[tokio::test]
    async fn purge_all_clears_every_key() {
        let entry = CacheEntry::new("SELECT * FROM t;".into(), false, vec![], vec![]);
        entry.get_with("a".into(), || async { Ok(buf()) }).await.unwrap();
        entry.get_with("b".into(), || async { Ok(buf()) }).await.unwrap();

        entry.purge_all(1);

        entry.get_with("a".into(), || async { Ok(buf()) }).await.unwrap();
        let stats = entry.stats();
        assert_eq!(stats.misses, 3);
    }

    #[tokio::test]
    async fn freshness_check_reflects_purge_and_forget() {
        let entry = CacheEntry::new("SELECT * FROM t WHERE id = ?;".into(), true, vec![], vec![]);
        assert!(!entry.is_newer_than("a", 0));

        entry.forget("a", 100);
        assert!(entry.is_newer_than("a", 50));
        assert!(!entry.is_newer_than("a", 150));
        assert!(!entry.is_newer_than("b", 50));

        entry.purge_all(200);
        assert!(entry.is_newer_than("anything", 150));
    }
}
