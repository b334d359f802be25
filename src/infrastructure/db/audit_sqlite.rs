use crate::application::use_cases::audit_logger::AuditSink;
use crate::domain::audit::{AuditOutcome, AuditRecord};
use crate::domain::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    pub async fn init(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Database(format!("Failed to parse connection string: {}", e)))?
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database, so keep one.
        let in_memory = database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect: {}", e)))?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ai_sql_audit (
                audit_id TEXT PRIMARY KEY,
                template_id TEXT,
                parameters TEXT NOT NULL,
                user_role TEXT,
                context TEXT,
                generated_sql TEXT,
                intent_sha256 TEXT NOT NULL,
                status TEXT NOT NULL,
                error_code TEXT,
                reason TEXT,
                created_at DATETIME NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create audit table: {}", e)))?;

        Ok(Self { pool })
    }

    /// Newest records first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>> {
        let limit = limit.clamp(1, 500);

        let entities = sqlx::query_as::<_, AuditRecordEntity>(
            "SELECT audit_id, template_id, parameters, user_role, context, generated_sql,
                    intent_sha256, status, error_code, reason, created_at
             FROM ai_sql_audit ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch audit records: {}", e)))?;

        entities.into_iter().map(AuditRecordEntity::into_record).collect()
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn write(&self, record: &AuditRecord) -> Result<()> {
        let (error_code, reason) = outcome_columns(&record.outcome);
        let context = record.context.as_ref().map(|c| c.to_string());

        sqlx::query(
            "INSERT OR IGNORE INTO ai_sql_audit (
                audit_id, template_id, parameters, user_role, context, generated_sql,
                intent_sha256, status, error_code, reason, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.audit_id)
        .bind(&record.template_id)
        .bind(record.parameters.to_string())
        .bind(&record.user_role)
        .bind(context)
        .bind(&record.generated_sql)
        .bind(&record.intent_sha256)
        .bind(record.outcome.label())
        .bind(error_code)
        .bind(reason)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to write audit record: {}", e)))?;

        Ok(())
    }
}

pub(crate) fn outcome_columns(outcome: &AuditOutcome) -> (Option<&str>, Option<&str>) {
    match outcome {
        AuditOutcome::Approved => (None, None),
        AuditOutcome::Denied { error_code, reason } => {
            (Some(error_code.as_str()), Some(reason.as_str()))
        }
    }
}

// Internal entity for database mapping
#[derive(sqlx::FromRow)]
struct AuditRecordEntity {
    audit_id: String,
    template_id: Option<String>,
    parameters: String,
    user_role: Option<String>,
    context: Option<String>,
    generated_sql: Option<String>,
    intent_sha256: String,
    status: String,
    error_code: Option<String>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl AuditRecordEntity {
    fn into_record(self) -> Result<AuditRecord> {
        let outcome = match self.status.as_str() {
            "approved" => AuditOutcome::Approved,
            "denied" => AuditOutcome::Denied {
                error_code: self.error_code.unwrap_or_default(),
                reason: self.reason.unwrap_or_default(),
            },
            other => {
                return Err(AppError::Database(format!(
                    "Unknown audit status '{}' for {}",
                    other, self.audit_id
                )))
            }
        };

        Ok(AuditRecord {
            parameters: serde_json::from_str(&self.parameters)?,
            context: self
                .context
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?,
            audit_id: self.audit_id,
            template_id: self.template_id,
            user_role: self.user_role,
            generated_sql: self.generated_sql,
            intent_sha256: self.intent_sha256,
            outcome,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::AuditEntry;
    use serde_json::json;

    async fn memory_sink() -> SqliteAuditSink {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteAuditSink::from_pool(pool).await.unwrap()
    }

    fn record(audit_id: &str, outcome: AuditOutcome) -> AuditRecord {
        AuditEntry {
            template_id: Some("daily_metrics_summary".to_string()),
            parameters: json!({ "start_date": "2024-01-01", "limit": 50 }),
            user_role: Some("analyst".to_string()),
            context: json!({ "page": "dashboard" }).as_object().cloned(),
            generated_sql: Some("SELECT 1".to_string()),
            intent: "daily metrics".to_string(),
            outcome,
        }
        .into_record(audit_id.to_string(), Utc::now())
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let sink = memory_sink().await;
        let written = record("a-1", AuditOutcome::Approved);

        sink.write(&written).await.unwrap();
        let records = sink.recent(10).await.unwrap();

        assert_eq!(records.len(), 1);
        let read = &records[0];
        assert_eq!(read.audit_id, "a-1");
        assert_eq!(read.parameters, json!({ "start_date": "2024-01-01", "limit": 50 }));
        assert_eq!(read.context, Some(json!({ "page": "dashboard" })));
        assert_eq!(read.intent_sha256, written.intent_sha256);
        assert_eq!(read.outcome, AuditOutcome::Approved);
    }

    #[tokio::test]
    async fn test_duplicate_write_is_ignored() {
        let sink = memory_sink().await;
        let written = record("a-1", AuditOutcome::Approved);

        sink.write(&written).await.unwrap();
        sink.write(&written).await.unwrap();

        assert_eq!(sink.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_denied_outcome_round_trips_reason() {
        let sink = memory_sink().await;
        let outcome = AuditOutcome::Denied {
            error_code: "missing_parameter".to_string(),
            reason: "Missing required parameter: baseline_end".to_string(),
        };

        sink.write(&record("d-1", outcome.clone())).await.unwrap();

        assert_eq!(sink.recent(1).await.unwrap()[0].outcome, outcome);
    }
}
