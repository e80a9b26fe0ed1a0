//! Invalidation Engine: computes the minimal [`CleanupTask`] a write
//! statement requires against the caches on its table.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::{CacheEntry, CacheRegistry};
use crate::key::encode_key;
use crate::plan::catalog::is_single_unique_condition;
use crate::plan::{Condition, DeleteQuery, InsertQuery, Operator, SchemaCatalog, UpdateQuery};
use crate::value::Value;

/// The value a single-EQ `WHERE` condition compares against: the bound
/// argument at its placeholder index, or — for a condition pinned to a
/// literal rather than a real placeholder, e.g. `name = 'payment_gateway_url'`
/// — the literal text itself. Looking this up wrong for a pinned condition
/// would index into `args` at an arbitrary position instead of using the
/// literal the WHERE clause actually names.
fn condition_value(condition: &Condition, args: &[Value]) -> Option<Value> {
    match &condition.placeholder {
        Some(p) => args.get(p.index).cloned(),
        None => condition.value.clone().map(Value::Text),
    }
}

/// One cache entry to forget a single key from.
#[derive(Clone)]
pub struct ForgetTask {
    pub cache: Arc<CacheEntry>,
    pub key: String,
}

/// The purge/forget list a write produces.
///
/// Applying a task is idempotent and side-effect-free beyond the caches it
/// names: purging an already-empty cache, or forgetting an absent key, is a
/// no-op.
#[derive(Clone, Default)]
pub struct CleanupTask {
    pub purges: Vec<Arc<CacheEntry>>,
    pub forgets: Vec<ForgetTask>,
}

impl CleanupTask {
    pub fn is_empty(&self) -> bool {
        self.purges.is_empty() && self.forgets.is_empty()
    }

    pub fn extend(&mut self, other: CleanupTask) {
        self.purges.extend(other.purges);
        self.forgets.extend(other.forgets);
    }

    /// Apply every purge and forget immediately (outside a transaction).
    pub fn apply(&self, now_ns: i64) {
        for cache in &self.purges {
            cache.purge_all(now_ns);
        }
        for task in &self.forgets {
            task.cache.forget(&task.key, now_ns);
        }
    }

    /// Mark affected caches without actually evicting anything: used when
    /// a write is deferred inside a transaction, so the freshness
    /// timestamps still move and concurrent in-tx readers bypass the cache
    /// even though the real eviction waits for commit.
    pub fn mark_only(&self, now_ns: i64) {
        for cache in &self.purges {
            cache.mark_purged(now_ns);
        }
        for task in &self.forgets {
            task.cache.mark_forgotten(&task.key, now_ns);
        }
    }
}

fn purge_every_cache_on_table(registry: &CacheRegistry, table: &str) -> CleanupTask {
    CleanupTask {
        purges: registry.entries_for_table(table).to_vec(),
        forgets: Vec::new(),
    }
}

/// Purge every cache in the registry — the correctness fallback for a
/// mutating query absent from the plan.
pub fn purge_all(registry: &CacheRegistry) -> CleanupTask {
    CleanupTask {
        purges: registry.all_entries().cloned().collect(),
        forgets: Vec::new(),
    }
}

/// `INSERT INTO table (columns) VALUES (row), (row), ...`.
pub fn compute_insert_cleanup(
    registry: &CacheRegistry,
    insert: &InsertQuery,
    args: &[Value],
) -> CleanupTask {
    let mut task = CleanupTask::default();

    let rows: Vec<&[Value]> = if insert.columns.is_empty() {
        Vec::new()
    } else {
        args.chunks(insert.columns.len()).collect()
    };

    for cache in registry.entries_for_table(&insert.table) {
        if cache.unique_only {
            // The inserted row's key cannot collide with an existing key,
            // and every other key in this cache remains valid.
            continue;
        }

        let Some(condition) = cache.single_eq_condition() else {
            task.purges.push(cache.clone());
            continue;
        };

        match insert.columns.iter().position(|c| c == &condition.column) {
            Some(idx) => {
                for row in &rows {
                    let Some(value) = row.get(idx) else {
                        continue;
                    };
                    task.forgets.push(ForgetTask {
                        cache: cache.clone(),
                        key: encode_key(std::slice::from_ref(value)),
                    });
                }
            }
            None => task.purges.push(cache.clone()),
        }
    }

    task
}

/// `UPDATE table SET ... WHERE ...`.
pub fn compute_update_cleanup(
    registry: &CacheRegistry,
    update: &UpdateQuery,
    args: &[Value],
    schema: &SchemaCatalog,
) -> CleanupTask {
    let updated_targets: HashSet<&str> =
        update.targets.iter().map(|t| t.column.as_str()).collect();
    let touches = |cache: &CacheEntry| {
        cache
            .target_columns
            .iter()
            .any(|c| updated_targets.contains(c.as_str()))
    };

    if !is_single_unique_condition(&update.conditions, &update.table, schema) {
        let mut task = CleanupTask::default();
        for cache in registry.entries_for_table(&update.table) {
            if touches(cache) {
                task.purges.push(cache.clone());
            }
        }
        return task;
    }

    let condition = &update.conditions[0];
    let Some(value) = condition_value(condition, args) else {
        return purge_every_cache_on_table(registry, &update.table);
    };
    let key = encode_key(std::slice::from_ref(&value));

    let mut task = CleanupTask::default();
    for cache in registry.entries_for_table(&update.table) {
        if !touches(cache) {
            continue;
        }
        match cache.single_eq_condition() {
            Some(c) if cache.unique_only && c.column == condition.column => {
                task.forgets.push(ForgetTask {
                    cache: cache.clone(),
                    key: key.clone(),
                });
            }
            _ => task.purges.push(cache.clone()),
        }
    }
    task
}

/// `DELETE FROM table WHERE ...`.
pub fn compute_delete_cleanup(
    registry: &CacheRegistry,
    delete: &DeleteQuery,
    args: &[Value],
    schema: &SchemaCatalog,
) -> CleanupTask {
    if !is_single_unique_condition(&delete.conditions, &delete.table, schema) {
        return purge_every_cache_on_table(registry, &delete.table);
    }

    let condition = &delete.conditions[0];
    let Some(value) = condition_value(condition, args) else {
        return purge_every_cache_on_table(registry, &delete.table);
    };
    let key = encode_key(std::slice::from_ref(&value));

    let mut task = CleanupTask::default();
    for cache in registry.entries_for_table(&delete.table) {
        if cache.unique_only {
            task.forgets.push(ForgetTask {
                cache: cache.clone(),
                key: key.clone(),
            });
        } else {
            task.purges.push(cache.clone());
        }
    }
    task
}
