//! Cache-plan document, schema, and compiled catalog.

pub mod catalog;
pub mod format;
pub mod model;
pub mod schema;

pub use catalog::{CacheCatalog, CacheableSelect};
pub use format::parse_plan;
pub use model::{
    CachePlan, Condition, DeleteQuery, InsertQuery, Operator, Order, Placeholder, QueryInfo,
    SelectQuery, SortDirection, UpdateQuery, UpdateTarget,
};
pub use schema::{read_schema, ColumnSchema, ColumnType, SchemaCatalog, TableSchema};
