//! Read-only statement guard for template SQL
//!
//! Run once per template at registry load. Template text is trusted
//! configuration, but a template that could mutate data or smuggle a second
//! statement must never make it into the registry:
//! - Must start with SELECT or WITH
//! - No data/schema-changing keywords (whole-word match)
//! - No statement separators
//! - No SQL comments

use once_cell::sync::Lazy;
use regex::Regex;

/// Whole-word match; `\b` treats `_` as a word character, so `updated_at`
/// and `last_update` do not trip the `UPDATE` check.
static FORBIDDEN_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:INSERT|UPDATE|DELETE|DROP|ALTER|TRUNCATE|CREATE|GRANT|REVOKE|PRAGMA|ATTACH|DETACH|COPY|EXECUTE)\b",
    )
    .unwrap()
});

/// Verify that template SQL is a single read-only statement.
pub fn verify_read_only(sql: &str) -> std::result::Result<(), String> {
    let sql_upper = sql.trim().to_uppercase();

    if !(sql_upper.starts_with("SELECT") || sql_upper.starts_with("WITH")) {
        return Err("Template must start with SELECT or WITH".to_string());
    }

    if let Some(keyword) = FORBIDDEN_KEYWORD.find(sql) {
        return Err(format!(
            "Template contains forbidden keyword: {}",
            keyword.as_str().to_uppercase()
        ));
    }

    if sql.contains(';') {
        return Err("Template must not contain statement separators".to_string());
    }

    if sql.contains("--") || sql.contains("/*") {
        return Err("Template must not contain SQL comments".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_and_cte_accepted() {
        assert!(verify_read_only("SELECT region FROM daily_metrics WHERE date = $1").is_ok());
        assert!(verify_read_only(
            "  WITH baseline AS (SELECT 1 AS x) SELECT x FROM baseline"
        )
        .is_ok());
    }

    #[test]
    fn test_mutating_statement_rejected() {
        let err = verify_read_only("DELETE FROM daily_metrics").unwrap_err();
        assert!(err.contains("SELECT or WITH"));

        let err =
            verify_read_only("WITH x AS (DELETE FROM t RETURNING *) SELECT * FROM x").unwrap_err();
        assert!(err.contains("DELETE"));
    }

    #[test]
    fn test_column_names_containing_keywords_allowed() {
        assert!(verify_read_only("SELECT created_at, updated_at, last_update FROM t").is_ok());
        assert!(verify_read_only("SELECT deleted, executed_by FROM audit_trail").is_ok());
    }

    #[test]
    fn test_lowercase_keyword_rejected() {
        let err = verify_read_only("with x as (select 1) select * from x where 1 = 1 or drop")
            .unwrap_err();
        assert!(err.ends_with("DROP"));

        let err = verify_read_only("SELECT 1 FROM t\nUNION SELECT 2 FROM u\nCopy").unwrap_err();
        assert!(err.contains("COPY"));
    }

    #[test]
    fn test_separators_and_comments_rejected() {
        assert!(verify_read_only("SELECT 1; SELECT 2").is_err());
        assert!(verify_read_only("SELECT 1 -- trailing").is_err());
        assert!(verify_read_only("SELECT /* hidden */ 1").is_err());
    }
}
