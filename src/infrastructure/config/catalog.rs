use crate::domain::error::{AppError, Result};
use crate::domain::template::{
    FilterBinding, IntentRule, ParamType, ParameterSpec, TemplateCatalog, TemplateDefinition,
    ValidationRules,
};
use figment::providers::{Format, Toml};
use figment::Figment;
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

/// Free-text filter values: words of letters and digits joined by a single
/// space or one of `._-`, up to 64 chars. No quotes, semicolons, backslashes
/// or runs of whitespace can pass.
const LABEL_PATTERN: &str = "[A-Za-z0-9]+(?:[ ._-][A-Za-z0-9]+)*";
const LABEL_MAX_LEN: f64 = 64.0;

/// The stock template set and routing table.
pub fn builtin_catalog() -> TemplateCatalog {
    TemplateCatalog {
        templates: vec![
            daily_metrics_summary(),
            top_products(),
            anomaly_detection(),
        ],
        intents: vec![
            intent("daily_metrics", &["daily", "metrics", "summary"], "daily_metrics_summary"),
            intent("top_products", &["product", "top", "best"], "top_products"),
            intent(
                "anomalies",
                &["anomaly", "anomalies", "spike", "unusual"],
                "anomaly_detection",
            ),
        ],
    }
}

/// Load a catalog from a TOML file with `[[templates]]` and `[[intents]]`
/// tables.
pub fn load_catalog(path: &Path) -> Result<TemplateCatalog> {
    if !path.is_file() {
        return Err(AppError::Config(format!(
            "Template catalog not found: {}",
            path.display()
        )));
    }

    let catalog: TemplateCatalog = Figment::from(Toml::file(path)).extract()?;
    info!(
        path = %path.display(),
        templates = catalog.templates.len(),
        intents = catalog.intents.len(),
        "Loaded template catalog"
    );
    Ok(catalog)
}

fn daily_metrics_summary() -> TemplateDefinition {
    TemplateDefinition {
        id: "daily_metrics_summary".to_string(),
        name: "Daily Metrics Summary".to_string(),
        description: "Get aggregated metrics for a date range".to_string(),
        sql: r#"
            SELECT
                date,
                region,
                SUM(total_transactions) AS transactions,
                SUM(total_revenue) AS revenue,
                AVG(avg_transaction_value) AS avg_value
            FROM daily_metrics
            WHERE date BETWEEN $1 AND $2
                {{region_filter}}
            GROUP BY date, region
            ORDER BY date DESC
            LIMIT $3
        "#
        .to_string(),
        parameters: vec![
            param("start_date", ParamType::Date, true),
            param("end_date", ParamType::Date, true),
            param("limit", ParamType::Number, false)
                .with_default(json!(100))
                .with_rules(count(1.0, 1000.0)),
            param("region", ParamType::String, false).with_rules(label()),
        ],
        filters: vec![filter("region_filter", "region", "region")],
        scopes: vec!["daily_metrics:read".to_string()],
    }
}

fn top_products() -> TemplateDefinition {
    TemplateDefinition {
        id: "top_products".to_string(),
        name: "Top Products Analysis".to_string(),
        description: "Get top performing products by revenue".to_string(),
        sql: r#"
            SELECT
                category,
                brand,
                COUNT(DISTINCT transaction_id) AS transaction_count,
                SUM(units) AS total_units,
                SUM(peso_value) AS total_revenue
            FROM transactions
            WHERE timestamp >= $1
                {{category_filter}}
                {{brand_filter}}
            GROUP BY category, brand
            ORDER BY total_revenue DESC
            LIMIT $2
        "#
        .to_string(),
        parameters: vec![
            param("start_date", ParamType::Date, true),
            param("limit", ParamType::Number, false)
                .with_default(json!(100))
                .with_rules(count(1.0, 100.0)),
            param("category", ParamType::String, false).with_rules(label()),
            param("brand", ParamType::String, false).with_rules(label()),
        ],
        filters: vec![
            filter("category_filter", "category", "category"),
            filter("brand_filter", "brand", "brand"),
        ],
        scopes: vec!["transactions:read".to_string()],
    }
}

fn anomaly_detection() -> TemplateDefinition {
    TemplateDefinition {
        id: "anomaly_detection".to_string(),
        name: "Anomaly Detection Query".to_string(),
        description: "Detect anomalies in metrics".to_string(),
        sql: r#"
            WITH baseline AS (
                SELECT
                    region,
                    AVG(total_revenue) AS avg_revenue,
                    STDDEV(total_revenue) AS stddev_revenue
                FROM daily_metrics
                WHERE date BETWEEN $1 AND $2
                GROUP BY region
            ),
            current_day AS (
                SELECT
                    region,
                    date,
                    total_revenue
                FROM daily_metrics
                WHERE date = $3
            )
            SELECT
                c.region,
                c.date,
                c.total_revenue,
                b.avg_revenue,
                ((c.total_revenue - b.avg_revenue) / NULLIF(b.stddev_revenue, 0)) AS z_score,
                ((c.total_revenue - b.avg_revenue) / NULLIF(b.avg_revenue, 0) * 100) AS pct_change
            FROM current_day c
            JOIN baseline b ON c.region = b.region
            WHERE ABS((c.total_revenue - b.avg_revenue) / NULLIF(b.avg_revenue, 0)) > $4
        "#
        .to_string(),
        parameters: vec![
            param("baseline_start", ParamType::Date, true),
            param("baseline_end", ParamType::Date, true),
            param("check_date", ParamType::Date, true),
            param("threshold", ParamType::Number, false)
                .with_default(json!(0.15))
                .with_rules(range(0.1, 1.0)),
        ],
        filters: Vec::new(),
        scopes: vec!["daily_metrics:read".to_string()],
    }
}

fn param(name: &str, param_type: ParamType, required: bool) -> ParameterSpec {
    ParameterSpec {
        name: name.to_string(),
        param_type,
        required,
        default: None,
        validation: None,
    }
}

trait SpecExt {
    fn with_default(self, value: Value) -> Self;
    fn with_rules(self, rules: ValidationRules) -> Self;
}

impl SpecExt for ParameterSpec {
    fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn with_rules(mut self, rules: ValidationRules) -> Self {
        self.validation = Some(rules);
        self
    }
}

fn range(min: f64, max: f64) -> ValidationRules {
    ValidationRules {
        min: Some(min),
        max: Some(max),
        ..ValidationRules::default()
    }
}

fn count(min: f64, max: f64) -> ValidationRules {
    ValidationRules {
        integer: true,
        ..range(min, max)
    }
}

fn label() -> ValidationRules {
    ValidationRules {
        max: Some(LABEL_MAX_LEN),
        pattern: Some(LABEL_PATTERN.to_string()),
        ..ValidationRules::default()
    }
}

fn filter(token: &str, parameter: &str, column: &str) -> FilterBinding {
    FilterBinding {
        token: token.to_string(),
        parameter: parameter.to_string(),
        column: column.to_string(),
    }
}

fn intent(category: &str, keywords: &[&str], template_id: &str) -> IntentRule {
    IntentRule {
        category: category.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        template_id: template_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_intents_point_at_builtin_templates() {
        let catalog = builtin_catalog();
        for rule in &catalog.intents {
            assert!(
                catalog.templates.iter().any(|t| t.id == rule.template_id),
                "rule {} points at unknown template",
                rule.category
            );
        }
    }

    #[test]
    fn test_load_catalog_from_toml() {
        let path = std::env::temp_dir().join(format!("catalog-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[[templates]]
id = "store_count"
name = "Store Count"
sql = "SELECT COUNT(*) FROM stores WHERE opened_on >= $1"
scopes = ["stores:read"]

[[templates.parameters]]
name = "since"
type = "date"
required = true

[[intents]]
category = "stores"
keywords = ["store"]
template_id = "store_count"
"#
        )
        .unwrap();

        let catalog = load_catalog(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(catalog.templates.len(), 1);
        assert_eq!(catalog.templates[0].parameters[0].param_type, ParamType::Date);
        assert_eq!(catalog.intents[0].keywords, vec!["store".to_string()]);
    }

    #[test]
    fn test_load_catalog_missing_file() {
        let err = load_catalog(Path::new("/nonexistent/catalog.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
