use crate::domain::error::CertificationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificationRequest {
    pub intent: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl CertificationRequest {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            ..Self::default()
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        if let Value::Object(map) = parameters {
            self.parameters = map;
        }
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.user_role = Some(role.into());
        self
    }
}

/// Parameters that passed every rule of one template, after coercion and
/// defaulting. Only the validator builds these, so the assembler can trust
/// every value it is handed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedParameters(BTreeMap<String, Value>);

impl ValidatedParameters {
    pub(crate) fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub(crate) fn insert(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Wire shape of a certification outcome.
///
/// Approved results carry `sql`, `template_used`, `parameters_validated` and
/// `audit_id`; denied results carry `error`, `error_code` and, when a template
/// had already been matched, `template_used`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificationResult {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters_validated: Option<ValidatedParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CertificationResult {
    pub fn approved(
        sql: String,
        template_id: &str,
        parameters: ValidatedParameters,
        audit_id: String,
    ) -> Self {
        Self {
            approved: true,
            sql: Some(sql),
            template_used: Some(template_id.to_string()),
            parameters_validated: Some(parameters),
            audit_id: Some(audit_id),
            error: None,
            error_code: None,
        }
    }

    pub fn denied(error: &CertificationError, template_id: Option<&str>) -> Self {
        let message = match (error.is_validation(), template_id) {
            (true, Some(id)) => format!(
                "Parameter validation failed for template '{}': {}",
                id, error
            ),
            (true, None) => format!("Parameter validation failed: {}", error),
            (false, _) => error.to_string(),
        };

        Self {
            approved: false,
            sql: None,
            template_used: template_id.map(|id| id.to_string()),
            parameters_validated: None,
            audit_id: None,
            error: Some(message),
            error_code: Some(error.code().to_string()),
        }
    }

    /// Denial audits are opt-in; when recorded, the id is attached.
    pub fn with_audit_id(mut self, audit_id: String) -> Self {
        self.audit_id = Some(audit_id);
        self
    }
}

/// Gateway lifecycle. `Approved` and `Denied` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationState {
    Unresolved,
    Resolved,
    Validated,
    Approved,
    Denied,
}

impl CertificationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CertificationState::Approved | CertificationState::Denied)
    }

    /// Legal forward edges of the lifecycle.
    pub fn can_transition_to(&self, next: CertificationState) -> bool {
        use CertificationState::*;
        matches!(
            (self, next),
            (Unresolved, Resolved)
                | (Unresolved, Denied)
                | (Resolved, Validated)
                | (Resolved, Denied)
                | (Validated, Approved)
        )
    }
}
