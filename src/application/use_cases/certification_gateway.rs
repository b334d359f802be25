//! Certification Gateway
//!
//! Drives one request through `Unresolved -> Resolved -> Validated ->
//! Approved`, with `Denied` reachable from the first two states. Caller
//! mistakes end as a denied result; only internal faults surface as `Err`.

use crate::application::use_cases::audit_logger::AuditLogger;
use crate::application::use_cases::clause_assembler::assemble_sql;
use crate::application::use_cases::intent_resolver::IntentResolver;
use crate::application::use_cases::parameter_validator::validate_parameters;
use crate::application::use_cases::template_registry::TemplateRegistry;
use crate::domain::audit::{AuditEntry, AuditOutcome};
use crate::domain::certification::{
    CertificationRequest, CertificationResult, CertificationState, ValidatedParameters,
};
use crate::domain::error::{AppError, CertificationError, Result};
use crate::domain::template::Template;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

enum Step<'a> {
    Unresolved,
    Resolved(&'a Template),
    Validated(&'a Template, ValidatedParameters),
    Approved(CertificationResult),
    Denied(CertificationError, Option<&'a Template>),
}

impl Step<'_> {
    fn state(&self) -> CertificationState {
        match self {
            Step::Unresolved => CertificationState::Unresolved,
            Step::Resolved(_) => CertificationState::Resolved,
            Step::Validated(..) => CertificationState::Validated,
            Step::Approved(_) => CertificationState::Approved,
            Step::Denied(..) => CertificationState::Denied,
        }
    }
}

pub struct CertificationGateway {
    registry: Arc<TemplateRegistry>,
    resolver: IntentResolver,
    audit: Arc<AuditLogger>,
}

impl CertificationGateway {
    pub fn new(
        registry: Arc<TemplateRegistry>,
        resolver: IntentResolver,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            registry,
            resolver,
            audit,
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    #[instrument(skip_all, fields(user_role = request.user_role.as_deref().unwrap_or("-")))]
    pub async fn certify(&self, request: CertificationRequest) -> Result<CertificationResult> {
        let mut step = Step::Unresolved;

        loop {
            let from = step.state();
            step = match step {
                Step::Unresolved => match self.resolver.resolve(&request.intent)? {
                    Some(template) => Step::Resolved(template),
                    None => Step::Denied(CertificationError::NoMatchingTemplate, None),
                },
                Step::Resolved(template) => {
                    if template.scopes().is_empty() {
                        return Err(AppError::Internal(format!(
                            "Template '{}' has no scopes",
                            template.id()
                        )));
                    }
                    match validate_parameters(template, &request.parameters) {
                        Ok(params) => Step::Validated(template, params),
                        Err(err) => Step::Denied(err, Some(template)),
                    }
                }
                Step::Validated(template, params) => {
                    let sql = assemble_sql(template, &params);
                    let audit_id = self
                        .audit
                        .record(AuditEntry {
                            template_id: Some(template.id().to_string()),
                            parameters: params.to_json(),
                            user_role: request.user_role.clone(),
                            context: request.context.clone(),
                            generated_sql: Some(sql.clone()),
                            intent: request.intent.clone(),
                            outcome: AuditOutcome::Approved,
                        })
                        .await;
                    Step::Approved(CertificationResult::approved(
                        sql,
                        template.id(),
                        params,
                        audit_id,
                    ))
                }
                Step::Approved(result) => {
                    info!(
                        template_id = result.template_used.as_deref().unwrap_or_default(),
                        audit_id = result.audit_id.as_deref().unwrap_or_default(),
                        "Certification approved"
                    );
                    return Ok(result);
                }
                Step::Denied(err, template) => {
                    return Ok(self.deny(&request, err, template).await);
                }
            };

            debug!(from = ?from, to = ?step.state(), "Certification state changed");
            debug_assert!(from.can_transition_to(step.state()));
        }
    }

    async fn deny(
        &self,
        request: &CertificationRequest,
        err: CertificationError,
        template: Option<&Template>,
    ) -> CertificationResult {
        let template_id = template.map(|t| t.id());
        let result = CertificationResult::denied(&err, template_id);

        info!(
            template_id = template_id.unwrap_or("-"),
            error_code = err.code(),
            "Certification denied"
        );

        if !self.audit.audits_denials() {
            return result;
        }

        let audit_id = self
            .audit
            .record(AuditEntry {
                template_id: template_id.map(str::to_string),
                parameters: Value::Object(request.parameters.clone()),
                user_role: request.user_role.clone(),
                context: request.context.clone(),
                generated_sql: None,
                intent: request.intent.clone(),
                outcome: AuditOutcome::Denied {
                    error_code: err.code().to_string(),
                    reason: result.error.clone().unwrap_or_default(),
                },
            })
            .await;

        result.with_audit_id(audit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::audit_logger::{AuditLoggerConfig, InMemoryAuditSink};
    use crate::domain::template::IntentRule;
    use crate::infrastructure::config::catalog::builtin_catalog;
    use serde_json::json;

    fn gateway_with(audit_denials: bool) -> (CertificationGateway, Arc<InMemoryAuditSink>) {
        let catalog = builtin_catalog();
        let registry = Arc::new(TemplateRegistry::from_definitions(catalog.templates).unwrap());
        let resolver = IntentResolver::new(registry.clone(), catalog.intents).unwrap();
        let sink = Arc::new(InMemoryAuditSink::new());
        let audit = Arc::new(AuditLogger::new(
            sink.clone(),
            AuditLoggerConfig {
                audit_denials,
                ..AuditLoggerConfig::default()
            },
        ));
        (CertificationGateway::new(registry, resolver, audit), sink)
    }

    #[tokio::test]
    async fn test_daily_metrics_summary_approved() {
        let (gateway, sink) = gateway_with(false);
        let request = CertificationRequest::new("Show me daily metrics summary").with_parameters(
            json!({
                "start_date": "2024-01-01",
                "end_date": "2024-01-31",
                "limit": 50,
                "region": "NCR"
            }),
        );

        let result = gateway.certify(request).await.unwrap();

        assert!(result.approved);
        assert_eq!(result.template_used.as_deref(), Some("daily_metrics_summary"));
        let sql = result.sql.as_deref().unwrap();
        assert!(sql.contains("BETWEEN '2024-01-01' AND '2024-01-31'"));
        assert!(sql.contains("AND region = 'NCR'"));
        assert!(sql.ends_with("LIMIT 50"));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(Some(records[0].audit_id.clone()), result.audit_id);
        assert_eq!(records[0].generated_sql.as_deref(), Some(sql));
    }

    #[tokio::test]
    async fn test_top_products_defaults_limit() {
        let (gateway, _) = gateway_with(false);
        let request = CertificationRequest::new("top products this year")
            .with_parameters(json!({ "start_date": "2024-01-01" }));

        let result = gateway.certify(request).await.unwrap();

        assert!(result.approved);
        assert_eq!(result.template_used.as_deref(), Some("top_products"));
        let params = result.parameters_validated.unwrap();
        assert_eq!(params.get("limit"), Some(&json!(100)));
        assert!(result.sql.unwrap().ends_with("LIMIT 100"));
    }

    #[tokio::test]
    async fn test_anomalies_missing_parameter_denied() {
        let (gateway, sink) = gateway_with(false);
        let request = CertificationRequest::new("detect anomalies").with_parameters(json!({
            "baseline_start": "2024-01-01",
            "check_date": "2024-02-01"
        }));

        let result = gateway.certify(request).await.unwrap();

        assert!(!result.approved);
        assert_eq!(result.template_used.as_deref(), Some("anomaly_detection"));
        assert_eq!(result.error_code.as_deref(), Some("missing_parameter"));
        assert!(result.error.unwrap().contains("baseline_end"));
        assert!(result.sql.is_none());
        assert!(result.audit_id.is_none());
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_padded_filter_value_denied() {
        let (gateway, sink) = gateway_with(false);
        let request = CertificationRequest::new("daily metrics").with_parameters(json!({
            "start_date": "2024-01-01",
            "end_date": "2024-01-31",
            "region": "Metro    Manila   "
        }));

        let result = gateway.certify(request).await.unwrap();

        assert!(!result.approved);
        assert_eq!(result.error_code.as_deref(), Some("pattern_mismatch"));
        assert!(result.sql.is_none());
        assert!(sink.records().is_empty());

        let request = CertificationRequest::new("daily metrics").with_parameters(json!({
            "start_date": "2024-01-01",
            "end_date": "2024-01-31",
            "region": "Metro Manila"
        }));
        let sql = gateway.certify(request).await.unwrap().sql.unwrap();
        assert!(sql.contains("AND region = 'Metro Manila' GROUP BY"));
        assert!(!sql.contains("  "));
    }

    #[tokio::test]
    async fn test_fractional_limit_denied() {
        let (gateway, _) = gateway_with(false);
        let request = CertificationRequest::new("top products")
            .with_parameters(json!({ "start_date": "2024-01-01", "limit": 50.5 }));

        let result = gateway.certify(request).await.unwrap();

        assert!(!result.approved);
        assert_eq!(result.error_code.as_deref(), Some("type_mismatch"));
        assert!(result.error.unwrap().contains("limit"));
    }

    #[tokio::test]
    async fn test_no_matching_template() {
        let (gateway, _) = gateway_with(false);
        let result = gateway
            .certify(CertificationRequest::new("what's the weather"))
            .await
            .unwrap();

        assert!(!result.approved);
        assert_eq!(result.error_code.as_deref(), Some("no_matching_template"));
        assert!(result.template_used.is_none());
    }

    #[tokio::test]
    async fn test_identical_requests_distinct_audit_ids() {
        let (gateway, sink) = gateway_with(false);
        let request = CertificationRequest::new("top products")
            .with_role("analyst")
            .with_parameters(json!({ "start_date": "2024-01-01", "category": "Dairy" }));

        let first = gateway.certify(request.clone()).await.unwrap();
        let second = gateway.certify(request).await.unwrap();

        assert_eq!(first.sql, second.sql);
        assert_eq!(first.template_used, second.template_used);
        assert_ne!(first.audit_id, second.audit_id);
        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.records()[0].user_role.as_deref(), Some("analyst"));
    }

    #[tokio::test]
    async fn test_denials_audited_when_enabled() {
        let (gateway, sink) = gateway_with(true);
        let request = CertificationRequest::new("top products")
            .with_parameters(json!({ "start_date": "2024-01-01", "brand": "x' OR '1'='1" }));

        let result = gateway.certify(request).await.unwrap();

        assert!(!result.approved);
        assert_eq!(result.error_code.as_deref(), Some("pattern_mismatch"));
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(result.audit_id.as_deref(), Some(records[0].audit_id.as_str()));
        assert!(records[0].generated_sql.is_none());
        assert_eq!(records[0].outcome.label(), "denied");
    }

    #[tokio::test]
    async fn test_no_unresolved_markers_in_approved_sql() {
        let (gateway, _) = gateway_with(false);
        let request = CertificationRequest::new("unusual spike").with_parameters(json!({
            "baseline_start": "2024-01-01",
            "baseline_end": "2024-01-31",
            "check_date": "2024-02-01",
            "threshold": 0.5
        }));

        let result = gateway.certify(request).await.unwrap();
        let sql = result.sql.unwrap();

        assert!(!sql.contains("{{"));
        assert!(!regex::Regex::new(r"\$\d").unwrap().is_match(&sql));
        assert!(sql.ends_with("> 0.5"));
    }

    #[tokio::test]
    async fn test_custom_rules_route_to_injected_registry() {
        let catalog = builtin_catalog();
        let registry = Arc::new(TemplateRegistry::from_definitions(catalog.templates).unwrap());
        let rules = vec![IntentRule {
            category: "bestsellers".to_string(),
            keywords: vec!["sellers".to_string()],
            template_id: "top_products".to_string(),
        }];
        let resolver = IntentResolver::new(registry.clone(), rules).unwrap();
        let audit = Arc::new(AuditLogger::new(
            Arc::new(InMemoryAuditSink::new()),
            AuditLoggerConfig::default(),
        ));
        let gateway = CertificationGateway::new(registry, resolver, audit);

        let denied = gateway
            .certify(CertificationRequest::new("daily summary"))
            .await
            .unwrap();
        assert_eq!(denied.error_code.as_deref(), Some("no_matching_template"));

        let approved = gateway
            .certify(
                CertificationRequest::new("sellers")
                    .with_parameters(json!({ "start_date": "2024-01-01" })),
            )
            .await
            .unwrap();
        assert!(approved.approved);
    }
}
