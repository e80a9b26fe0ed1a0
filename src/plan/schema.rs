//! Table schema: the `unique_only` detection input for the cache-plan
//! catalog. Parsing is a deliberately narrow, regex-based reader of
//! `CREATE TABLE` statements — not a general SQL parser, which is out of
//! scope.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Bytes,
    Int,
    DateTime,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
    pub is_primary: bool,
    pub is_unique: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// The full set of tables a driver was configured with, by table name.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: HashMap<String, TableSchema>,
}

impl SchemaCatalog {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn insert(&mut self, schema: TableSchema) {
        self.tables.insert(schema.table_name.clone(), schema);
    }
}

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)CREATE TABLE\s+`?(\w+)`?\s*\((.*?)\)\s*(?:ENGINE|;|$)").unwrap()
});
static COLUMN_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^`?(\w+)`?\s+(\w+)").unwrap());
static PRIMARY_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PRIMARY KEY\s*\(`?(\w+)`?\)").unwrap());
static UNIQUE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)UNIQUE\s*(?:KEY|INDEX)?\s*(?:\w+\s*)?\(`?(\w+)`?\)").unwrap());

/// Table-level constraint lines (`PRIMARY KEY (...)`, `UNIQUE (...)`,
/// `KEY idx (...)`, `CONSTRAINT ... FOREIGN KEY (...)`, ...) name a key, not
/// a column; without this guard [`COLUMN_LINE`] happily matches their first
/// two words as a bogus column (e.g. a column literally named `PRIMARY` of
/// type `KEY`).
fn is_table_constraint_line(line: &str) -> bool {
    let first_word = line
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_start_matches('`')
        .to_ascii_uppercase();
    matches!(
        first_word.as_str(),
        "PRIMARY" | "UNIQUE" | "KEY" | "INDEX" | "CONSTRAINT" | "FOREIGN" | "CHECK" | "FULLTEXT"
    )
}

fn column_type(raw: &str) -> ColumnType {
    let raw = raw.to_ascii_lowercase();
    if raw.starts_with("varchar") || raw.starts_with("char") || raw.starts_with("text") {
        ColumnType::Text
    } else if raw.starts_with("blob") || raw.starts_with("binary") || raw.starts_with("varbinary") {
        ColumnType::Bytes
    } else if raw.starts_with("int") || raw.starts_with("bigint") || raw.starts_with("smallint")
        || raw.starts_with("tinyint")
    {
        ColumnType::Int
    } else if raw.starts_with("datetime") || raw.starts_with("timestamp") || raw.starts_with("date") {
        ColumnType::DateTime
    } else {
        ColumnType::Unknown
    }
}

/// Parse one or more `CREATE TABLE` statements into a [`SchemaCatalog`].
///
/// Unrecognized statements (views, `CREATE INDEX`, comments, ...) are
/// skipped rather than rejected, since the DDL file is expected to be a
/// superset dump rather than a schema the driver fully owns.
pub fn read_schema(ddl: &str) -> Result<SchemaCatalog, ConfigError> {
    let mut catalog = SchemaCatalog::default();

    for caps in CREATE_TABLE.captures_iter(ddl) {
        let table_name = caps[1].to_string();
        let body = &caps[2];

        let primary: Vec<&str> = PRIMARY_KEY
            .captures_iter(body)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();
        let uniques: Vec<&str> = UNIQUE_KEY
            .captures_iter(body)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();

        let mut columns = Vec::new();
        for line in body.split(',') {
            let line = line.trim();
            if is_table_constraint_line(line) {
                continue;
            }
            let Some(caps) = COLUMN_LINE.captures(line) else {
                continue;
            };
            let name = caps[1].to_string();
            let data_type = column_type(&caps[2]);
            let nullable = !line.to_ascii_uppercase().contains("NOT NULL");
            let is_primary = primary.iter().any(|p| p.eq_ignore_ascii_case(&name))
                || line.to_ascii_uppercase().contains("PRIMARY KEY");
            let is_unique = is_primary
                || uniques.iter().any(|u| u.eq_ignore_ascii_case(&name))
                || line.to_ascii_uppercase().contains("UNIQUE");

            columns.push(ColumnSchema {
                name,
                data_type,
                nullable,
                is_primary,
                is_unique,
            });
        }

        if columns.is_empty() {
            continue;
        }
        catalog.insert(TableSchema {
            table_name,
            columns,
        });
    }

    if catalog.tables.is_empty() {
        return Err(ConfigError::EmptySchema);
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDL: &str = r#"
        CREATE TABLE users (
            id BIGINT NOT NULL,
            name VARCHAR(255) NOT NULL,
            age INT,
            group_id BIGINT,
            created_at DATETIME NOT NULL,
            PRIMARY KEY (id)
        ) ENGINE=InnoDB;
    "#;

    #[test]
    fn parses_primary_key_as_unique() {
        let catalog = read_schema(DDL).unwrap();
        let users = catalog.table("users").unwrap();
        let id = users.column("id").unwrap();
        assert!(id.is_primary);
        assert!(id.is_unique);
        assert!(!id.nullable);
    }

    /// A table-level `PRIMARY KEY (id)` line must not be mistaken for a
    /// column declaration named `PRIMARY`.
    #[test]
    fn table_level_primary_key_line_is_not_a_phantom_column() {
        let catalog = read_schema(DDL).unwrap();
        let users = catalog.table("users").unwrap();
        assert_eq!(users.columns.len(), 5);
        assert!(users.column("primary").is_none());
        assert!(users.column("key").is_none());
    }

    /// Same for a table-level `UNIQUE (...)`/`UNIQUE KEY ...` constraint.
    #[test]
    fn table_level_unique_constraint_is_not_a_phantom_column() {
        let ddl = r#"
            CREATE TABLE settings (
                id BIGINT NOT NULL,
                name VARCHAR(255) NOT NULL,
                PRIMARY KEY (id),
                UNIQUE KEY uq_name (name)
            ) ENGINE=InnoDB;
        "#;
        let catalog = read_schema(ddl).unwrap();
        let settings = catalog.table("settings").unwrap();
        assert_eq!(settings.columns.len(), 2);
        let name = settings.column("name").unwrap();
        assert!(name.is_unique);
        assert!(!name.is_primary);
    }

    #[test]
    fn nullable_column_without_not_null() {
        let catalog = read_schema(DDL).unwrap();
        let users = catalog.table("users").unwrap();
        let group_id = users.column("group_id").unwrap();
        assert!(group_id.nullable);
        assert!(!group_id.is_unique);
    }

    #[test]
    fn empty_ddl_is_config_error() {
        assert!(matches!(read_schema(""), Err(ConfigError::EmptySchema)));
    }
}
