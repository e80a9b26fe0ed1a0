//! Query normalizer: a purely textual, idempotent transform used to derive
//! the cache-plan catalog key from raw SQL.

use once_cell::sync::Lazy;
use regex::Regex;

static SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static INSERT_INTO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)INSERT INTO (\w+)\s*\(").unwrap());
static IN_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)IN\s*\((\?,\s*)*\?\)").unwrap());
static VALUES_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)VALUES\s*\((\?,\s*)*\?\)").unwrap());

/// Normalize a raw SQL string into the canonical catalog key.
///
/// `normalize(normalize(q)) == normalize(q)` for all `q`; inputs that are
/// not syntactically SQL pass through the whitespace/quote/semicolon steps
/// unchanged (no parsing is performed).
pub fn normalize_query(query: &str) -> String {
    let mut q = query.replace(['\r', '\n', '\t'], " ");
    q = SPACE.replace_all(&q, " ").trim().to_string();
    q = q.replace('`', "");
    q = INSERT_INTO.replace_all(&q, "INSERT INTO $1 (").into_owned();
    q = IN_LIST.replace_all(&q, "IN (?)").into_owned();
    q = VALUES_LIST.replace_all(&q, "VALUES (?)").into_owned();

    if !q.ends_with(';') {
        q.push(';');
    }
    q
}
