//! Loading the structured cache-plan document from YAML.

use crate::error::ConfigError;
use crate::plan::model::CachePlan;

pub fn parse_plan(yaml: &str) -> Result<CachePlan, ConfigError> {
    serde_yaml::from_str(yaml).map_err(ConfigError::Yaml)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
queries:
  - query: "SELECT * FROM livecomments WHERE livestream_id = ? ORDER BY created_at DESC"
    type: select
    table: livecomments
    cache: true
    targets: [id, user_id, livestream_id, comment, tip, created_at]
    conditions:
      - column: livestream_id
        operator: eq
    orders:
      - column: created_at
        order: desc
  - query: "DELETE FROM livecomments WHERE id = ?"
    type: delete
    table: livecomments
    conditions:
      - column: id
        operator: eq
  - query: "UPDATE settings SET value = ? WHERE name = 'payment_gateway_url'"
    type: update
    table: settings
    targets:
      - column: value
        placeholder:
          index: 0
    conditions:
      - column: name
        operator: eq
        value: payment_gateway_url
"#;

    #[test]
    fn parses_mixed_query_kinds() {
        let plan = parse_plan(DOC).unwrap();
        assert_eq!(plan.queries.len(), 3);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_plan("not: [valid, plan").is_err());
    }
}
