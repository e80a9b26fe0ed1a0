//! Per-query cache and the registry that wires compiled cache-plan entries
//! to live [`CacheEntry`] instances.

pub mod entry;

pub use entry::{CacheEntry, CacheEntryStats, DEFAULT_MAX_CAPACITY, DEFAULT_TTL};

use std::collections::HashMap;
use std::sync::Arc;

use crate::normalize::normalize_query;
use crate::plan::CacheCatalog;

/// All live [`CacheEntry`] instances for a running driver, indexed the same
/// way the compiled catalog indexes its cache plan entries.
#[derive(Default)]
pub struct CacheRegistry {
    by_normalized_query: HashMap<String, Arc<CacheEntry>>,
    by_table: HashMap<String, Vec<Arc<CacheEntry>>>,
}

impl CacheRegistry {
    /// Build one [`CacheEntry`] per cacheable select in `catalog`.
    pub fn from_catalog(catalog: &CacheCatalog) -> Self {
        let mut registry = CacheRegistry::default();
        for table in catalog.tables() {
            for cacheable in catalog.cacheable_selects_for_table(table) {
                let normalized = normalize_query(&cacheable.select.query);
                let entry = Arc::new(CacheEntry::new(
                    normalized.clone(),
                    cacheable.unique_only,
                    cacheable.select.conditions.clone(),
                    cacheable.select.targets.clone(),
                ));
                registry
                    .by_normalized_query
                    .insert(normalized, entry.clone());
                registry
                    .by_table
                    .entry(table.to_string())
                    .or_default()
                    .push(entry);
            }
        }
        registry
    }

    pub fn entry_for_query(&self, raw_query: &str) -> Option<Arc<CacheEntry>> {
        self.by_normalized_query
            .get(&normalize_query(raw_query))
            .cloned()
    }

    pub fn entries_for_table(&self, table: &str) -> &[Arc<CacheEntry>] {
        self.by_table.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every live cache entry, regardless of table — used by the wildcard
    /// "unknown mutating query" purge-all fallback and by diagnostics.
    pub fn all_entries(&self) -> impl Iterator<Item = &Arc<CacheEntry>> {
        self.by_normalized_query.values()
    }

    pub fn all_stats(&self) -> Vec<CacheEntryStats> {
        self.by_normalized_query
            .values()
            .map(|e| e.stats())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{parse_plan, read_schema, CacheCatalog};

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
"#;

    #[test]
    fn builds_one_entry_per_cacheable_select() {
        let schema = read_schema(SCHEMA).unwrap();
        let plan = parse_plan(PLAN).unwrap();
        let catalog = CacheCatalog::compile(&plan, &schema).unwrap();
        let registry = CacheRegistry::from_catalog(&catalog);

        assert!(registry.entry_for_query("SELECT * FROM `users` WHERE `id` = ?").is_some());
        assert_eq!(registry.entries_for_table("users").len(), 1);
    }
}
