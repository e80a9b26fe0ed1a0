//! Cache-plan catalog: the compiled, queryable form of a
//! [`CachePlan`](crate::plan::model::CachePlan) document — a map from
//! normalized query text to plan entry, plus a table -> cacheable-selects
//! index the invalidation engine walks on every write.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::normalize::normalize_query;
use crate::plan::model::{CachePlan, Operator, QueryInfo, SelectQuery};
use crate::plan::schema::SchemaCatalog;

/// A cacheable `SELECT` entry, annotated with the catalog-wide facts the
/// invalidation engine and read path need at lookup time.
#[derive(Debug, Clone)]
pub struct CacheableSelect {
    pub select: SelectQuery,
    /// `true` when the `WHERE` clause is a single equality condition on a
    /// primary or unique column — the only case the original driver
    /// tracks per-key instead of purging the whole cache on a write.
    pub unique_only: bool,
}

/// The compiled catalog a running driver routes against.
#[derive(Debug, Clone, Default)]
pub struct CacheCatalog {
    /// Normalized query text -> the plan entry it was compiled from.
    by_normalized_query: HashMap<String, QueryInfo>,
    /// Table name -> indices of its cacheable selects in `selects`.
    by_table: HashMap<String, Vec<usize>>,
    selects: Vec<CacheableSelect>,
}

impl CacheCatalog {
    pub fn compile(plan: &CachePlan, schema: &SchemaCatalog) -> Result<Self, ConfigError> {
        let mut catalog = CacheCatalog::default();

        for entry in &plan.queries {
            let key = normalize_query(entry.raw_query());
            catalog
                .by_normalized_query
                .insert(key, entry.clone());

            if let QueryInfo::Select(select) = entry {
                if !select.cache {
                    continue;
                }
                let table = select.table.clone().ok_or_else(|| {
                    ConfigError::InvalidPlan(format!(
                        "cacheable select has no table: {}",
                        select.query
                    ))
                })?;

                let unique_only = is_single_unique_condition(&select.conditions, &table, schema);
                let idx = catalog.selects.len();
                catalog.selects.push(CacheableSelect {
                    select: select.clone(),
                    unique_only,
                });
                catalog.by_table.entry(table).or_default().push(idx);
            }
        }

        Ok(catalog)
    }

    pub fn lookup(&self, raw_query: &str) -> Option<&QueryInfo> {
        self.by_normalized_query.get(&normalize_query(raw_query))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.by_table.keys().map(String::as_str)
    }

    /// Every normalized query text the catalog was loaded with, cacheable
    /// or not — the "set of observed queries" the diagnostic endpoint
    /// reports alongside cache statistics.
    pub fn observed_queries(&self) -> impl Iterator<Item = &str> {
        self.by_normalized_query.keys().map(String::as_str)
    }

    pub fn cacheable_selects_for_table(&self, table: &str) -> impl Iterator<Item = &CacheableSelect> {
        self.by_table
            .get(table)
            .into_iter()
            .flatten()
            .map(move |&i| &self.selects[i])
    }

    pub fn is_cacheable_select(&self, raw_query: &str) -> Option<&CacheableSelect> {
        let normalized = normalize_query(raw_query);
        let table = match self.by_normalized_query.get(&normalized)? {
            QueryInfo::Select(s) if s.cache => s.table.as_deref()?,
            _ => return None,
        };
        self.by_table
            .get(table)?
            .iter()
            .map(|&i| &self.selects[i])
            .find(|c| normalize_query(&c.select.query) == normalized)
    }
}

/// `true` iff `conditions` is exactly one `EQ` condition on a column the
/// schema marks primary or unique — the fast path a write can use to
/// narrow invalidation to a single cache key.
pub(crate) fn is_single_unique_condition(
    conditions: &[crate::plan::model::Condition],
    table: &str,
    schema: &SchemaCatalog,
) -> bool {
    let [only] = conditions else {
        return false;
    };
    if only.operator != Operator::Eq {
        return false;
    }
    let Some(table_schema) = schema.table(table) else {
        return false;
    };
    table_schema
        .column(&only.column)
        .map(|c| c.is_primary || c.is_unique)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::model::{Condition, DeleteQuery};
    use crate::plan::schema::read_schema;

    fn schema() -> SchemaCatalog {
        read_schema(
            r#"CREATE TABLE users (
                id BIGINT NOT NULL,
                name VARCHAR(255) NOT NULL,
                age INT,
                PRIMARY KEY (id)
            ) ENGINE=InnoDB;"#,
        )
        .unwrap()
    }

    fn plan_with(select: SelectQuery) -> CachePlan {
        CachePlan {
            queries: vec![QueryInfo::Select(select)],
        }
    }

    #[test]
    fn single_eq_on_primary_is_unique_only() {
        let select = SelectQuery {
            query: "SELECT * FROM users WHERE id = ?".into(),
            cache: true,
            table: Some("users".into()),
            targets: vec!["id".into(), "name".into()],
            conditions: vec![Condition {
                column: "id".into(),
                operator: Operator::Eq,
                placeholder: Some(crate::plan::model::Placeholder { index: 0, extra: false }),
                value: None,
            }],
            orders: vec![],
        };
        let catalog = CacheCatalog::compile(&plan_with(select), &schema()).unwrap();
        let entries: Vec<_> = catalog.cacheable_selects_for_table("users").collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].unique_only);
    }

    #[test]
    fn condition_on_non_unique_column_is_not_unique_only() {
        let select = SelectQuery {
            query: "SELECT * FROM users WHERE age = ?".into(),
            cache: true,
            table: Some("users".into()),
            targets: vec!["id".into()],
            conditions: vec![Condition {
                column: "age".into(),
                operator: Operator::Eq,
                placeholder: Some(crate::plan::model::Placeholder { index: 0, extra: false }),
                value: None,
            }],
            orders: vec![],
        };
        let catalog = CacheCatalog::compile(&plan_with(select), &schema()).unwrap();
        let entries: Vec<_> = catalog.cacheable_selects_for_table("users").collect();
        assert!(!entries[0].unique_only);
    }

    #[test]
    fn uncached_select_does_not_require_a_table() {
        let select = SelectQuery {
            query: "SELECT 1".into(),
            cache: false,
            table: None,
            targets: vec![],
            conditions: vec![],
            orders: vec![],
        };
        let catalog = CacheCatalog::compile(&plan_with(select), &schema()).unwrap();
        assert_eq!(catalog.cacheable_selects_for_table("users").count(), 0);
    }

    #[test]
    fn lookup_finds_by_normalized_text() {
        let plan = CachePlan {
            queries: vec![QueryInfo::Delete(DeleteQuery {
                query: "DELETE FROM users WHERE id = ?".into(),
                table: "users".into(),
                conditions: vec![Condition {
                    column: "id".into(),
                    operator: Operator::Eq,
                    placeholder: Some(crate::plan::model::Placeholder { index: 0, extra: false }),
                    value: None,
                }],
            })],
        };
        let catalog = CacheCatalog::compile(&plan, &schema()).unwrap();
        assert!(catalog.lookup("DELETE FROM `users` WHERE `id` = ?").is_some());
    }
}
