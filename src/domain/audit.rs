use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Approved,
    Denied { error_code: String, reason: String },
}

impl AuditOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AuditOutcome::Approved => "approved",
            AuditOutcome::Denied { .. } => "denied",
        }
    }
}

/// A decision waiting to be stamped with an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub template_id: Option<String>,
    pub parameters: Value,
    pub user_role: Option<String>,
    pub context: Option<Map<String, Value>>,
    pub generated_sql: Option<String>,
    pub intent: String,
    pub outcome: AuditOutcome,
}

impl AuditEntry {
    pub fn into_record(self, audit_id: String, created_at: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            audit_id,
            template_id: self.template_id,
            parameters: self.parameters,
            user_role: self.user_role,
            context: self.context.map(Value::Object),
            generated_sql: self.generated_sql,
            intent_sha256: hash_intent(&self.intent),
            outcome: self.outcome,
            created_at,
        }
    }
}

/// Persisted evidence of a certification decision. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: String,
    pub template_id: Option<String>,
    pub parameters: Value,
    pub user_role: Option<String>,
    pub context: Option<Value>,
    pub generated_sql: Option<String>,
    pub intent_sha256: String,
    pub outcome: AuditOutcome,
    pub created_at: DateTime<Utc>,
}

/// The raw intent is not stored, only its digest.
pub fn hash_intent(intent: &str) -> String {
    let normalized = intent.trim().to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}
