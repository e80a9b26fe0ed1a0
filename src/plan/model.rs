//! Cache-plan document types: a tagged union of query entries keyed by
//! `type`, each carrying the raw SQL text it matches plus per-kind cache
//! behavior.

use serde::{Deserialize, Serialize};

/// Comparison used by a [`Condition`]; only the two the driver needs to
/// reason about cache targeting are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    In,
}

/// An ordinal position in the parameterized SQL.
///
/// `extra` distinguishes a real `?` placeholder (numbered from the
/// statement's own parameter list) from a constant the analyzer lifted
/// during normalization (numbered from 0 again, with `extra = true`); the
/// runtime never sees lifted constants on its own, but keeps the flag so a
/// loaded plan can mark a condition as "pinned to a literal".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub index: usize,
    #[serde(default)]
    pub extra: bool,
}

/// One `WHERE`/`ON` clause term a cache plan cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    /// Absent only for conditions pinned to a literal rather than a
    /// placeholder (e.g. `name = 'payment_gateway_url'`); such a condition
    /// can never be satisfied by an argument, so the invalidation engine
    /// treats it like an extra/lifted arg and falls back to a whole-cache
    /// purge rather than guessing a key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<Placeholder>,
    /// The literal value a pinned condition compares against, present only
    /// when `placeholder` is `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    pub order: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub query: String,
    /// `false` opts the query out of caching entirely — still normalized
    /// and routed, but always delegated straight to the inner driver.
    #[serde(default)]
    pub cache: bool,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

/// One `SET` assignment whose right-hand side is a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTarget {
    pub column: String,
    pub placeholder: Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateQuery {
    pub query: String,
    pub table: String,
    #[serde(default)]
    pub targets: Vec<UpdateTarget>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteQuery {
    pub query: String,
    pub table: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertQuery {
    pub query: String,
    pub table: String,
    /// Column names in the order the `VALUES` rows supply them, used to
    /// chunk a multi-row insert's flattened argument list and to locate
    /// which argument (if any) feeds a given cache's single EQ condition.
    #[serde(default)]
    pub columns: Vec<String>,
}

/// One entry of the cache plan document.
///
/// The `type` tag on the wire selects which variant's extra fields are
/// present; serde's internally-tagged enum support handles the dispatch
/// declaratively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryInfo {
    Select(SelectQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
    Insert(InsertQuery),
}

impl QueryInfo {
    pub fn raw_query(&self) -> &str {
        match self {
            QueryInfo::Select(q) => &q.query,
            QueryInfo::Update(q) => &q.query,
            QueryInfo::Delete(q) => &q.query,
            QueryInfo::Insert(q) => &q.query,
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            QueryInfo::Select(q) => q.table.as_deref(),
            QueryInfo::Update(q) => Some(&q.table),
            QueryInfo::Delete(q) => Some(&q.table),
            QueryInfo::Insert(q) => Some(&q.table),
        }
    }
}

/// The top-level cache plan document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachePlan {
    pub queries: Vec<QueryInfo>,
}
