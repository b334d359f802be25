//! Intent Resolver
//!
//! Routes free-text intents to exactly one template using an ordered rule
//! table. Rules are evaluated in declared order and the first rule with any
//! keyword contained in the lowercased intent wins. There is no scoring, so
//! the same intent always resolves to the same template.

use crate::application::use_cases::template_registry::TemplateRegistry;
use crate::domain::error::{AppError, Result};
use crate::domain::template::{IntentRule, Template};
use std::sync::Arc;
use tracing::debug;

pub struct IntentResolver {
    registry: Arc<TemplateRegistry>,
    rules: Vec<IntentRule>,
}

impl IntentResolver {
    /// Keywords are lowercased once here and template ids trimmed, matching
    /// how the registry stores ids. Every rule must have at least one keyword
    /// and point at a registered template.
    pub fn new(registry: Arc<TemplateRegistry>, rules: Vec<IntentRule>) -> Result<Self> {
        let mut normalized = Vec::with_capacity(rules.len());

        for rule in rules {
            let keywords: Vec<String> = rule
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();

            if keywords.is_empty() {
                return Err(AppError::Config(format!(
                    "Intent rule '{}' has no keywords",
                    rule.category
                )));
            }
            let template_id = rule.template_id.trim().to_string();
            if !registry.contains(&template_id) {
                return Err(AppError::Config(format!(
                    "Intent rule '{}' points at unknown template '{}'",
                    rule.category, template_id
                )));
            }

            normalized.push(IntentRule {
                keywords,
                template_id,
                ..rule
            });
        }

        Ok(Self {
            registry,
            rules: normalized,
        })
    }

    /// First rule whose keyword set hits the intent.
    pub fn match_rule(&self, intent: &str) -> Option<&IntentRule> {
        let intent_lower = intent.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| intent_lower.contains(k.as_str())))
    }

    /// `Ok(None)` when no rule matches. A matched rule whose template is not
    /// registered is an internal error.
    pub fn resolve(&self, intent: &str) -> Result<Option<&Template>> {
        let Some(rule) = self.match_rule(intent) else {
            debug!("No intent rule matched");
            return Ok(None);
        };

        let template = self.registry.get(&rule.template_id).ok_or_else(|| {
            AppError::Internal(format!(
                "Intent rule '{}' references missing template '{}'",
                rule.category, rule.template_id
            ))
        })?;

        debug!(
            category = %rule.category,
            template_id = template.id(),
            "Intent resolved"
        );
        Ok(Some(template))
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::catalog::builtin_catalog;

    fn builtin_resolver() -> IntentResolver {
        let catalog = builtin_catalog();
        let registry = Arc::new(TemplateRegistry::from_definitions(catalog.templates).unwrap());
        IntentResolver::new(registry, catalog.intents).unwrap()
    }

    fn resolved_id(resolver: &IntentResolver, intent: &str) -> Option<String> {
        resolver
            .resolve(intent)
            .unwrap()
            .map(|t| t.id().to_string())
    }

    #[test]
    fn test_keyword_routing() {
        let resolver = builtin_resolver();
        assert_eq!(
            resolved_id(&resolver, "Show me daily metrics summary").as_deref(),
            Some("daily_metrics_summary")
        );
        assert_eq!(
            resolved_id(&resolver, "top products this year").as_deref(),
            Some("top_products")
        );
        assert_eq!(
            resolved_id(&resolver, "detect anomalies").as_deref(),
            Some("anomaly_detection")
        );
        assert_eq!(
            resolved_id(&resolver, "any UNUSUAL spikes?").as_deref(),
            Some("anomaly_detection")
        );
    }

    #[test]
    fn test_first_declared_rule_wins() {
        let resolver = builtin_resolver();
        // Hits both the daily_metrics and top_products keyword sets.
        assert_eq!(
            resolved_id(&resolver, "top products in the daily summary").as_deref(),
            Some("daily_metrics_summary")
        );
    }

    #[test]
    fn test_substring_containment() {
        let resolver = builtin_resolver();
        // "productivity" contains "product"
        assert_eq!(
            resolved_id(&resolver, "productivity report").as_deref(),
            Some("top_products")
        );
    }

    #[test]
    fn test_no_match() {
        let resolver = builtin_resolver();
        assert!(resolver.resolve("weather forecast").unwrap().is_none());
        assert!(resolver.resolve("").unwrap().is_none());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = builtin_resolver();
        let first = resolved_id(&resolver, "best sellers");
        for _ in 0..10 {
            assert_eq!(resolved_id(&resolver, "best sellers"), first);
        }
    }

    #[test]
    fn test_rule_for_unknown_template_rejected() {
        let catalog = builtin_catalog();
        let registry = Arc::new(TemplateRegistry::from_definitions(catalog.templates).unwrap());
        let rules = vec![IntentRule {
            category: "orphan".to_string(),
            keywords: vec!["orphan".to_string()],
            template_id: "missing".to_string(),
        }];

        let err = IntentResolver::new(registry, rules).err().unwrap();
        assert!(err.to_string().contains("unknown template"));
    }

    #[test]
    fn test_rule_without_keywords_rejected() {
        let catalog = builtin_catalog();
        let registry = Arc::new(TemplateRegistry::from_definitions(catalog.templates).unwrap());
        let rules = vec![IntentRule {
            category: "blank".to_string(),
            keywords: vec!["  ".to_string()],
            template_id: "top_products".to_string(),
        }];

        assert!(IntentResolver::new(registry, rules).is_err());
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let catalog = builtin_catalog();
        let registry = Arc::new(TemplateRegistry::from_definitions(catalog.templates).unwrap());
        let rules = vec![IntentRule {
            category: "shouting".to_string(),
            keywords: vec!["TOP".to_string()],
            template_id: "top_products".to_string(),
        }];
        let resolver = IntentResolver::new(registry, rules).unwrap();

        assert_eq!(
            resolved_id(&resolver, "Top sellers").as_deref(),
            Some("top_products")
        );
    }

    #[test]
    fn test_padded_template_id_resolves() {
        let catalog = builtin_catalog();
        let registry = Arc::new(TemplateRegistry::from_definitions(catalog.templates).unwrap());
        let rules = vec![IntentRule {
            category: "padded".to_string(),
            keywords: vec!["best".to_string()],
            template_id: "  top_products ".to_string(),
        }];
        let resolver = IntentResolver::new(registry, rules).unwrap();

        assert_eq!(resolver.rules()[0].template_id, "top_products");
        assert_eq!(
            resolved_id(&resolver, "best sellers").as_deref(),
            Some("top_products")
        );
    }
}
