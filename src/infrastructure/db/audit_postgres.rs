use crate::application::use_cases::audit_logger::AuditSink;
use crate::domain::audit::AuditRecord;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::db::audit_sqlite::outcome_columns;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Writes to the shared `ai_sql_audit` table.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub async fn init(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ai_sql_audit (
                audit_id TEXT PRIMARY KEY,
                template_id TEXT,
                parameters JSONB NOT NULL,
                user_role TEXT,
                context JSONB,
                generated_sql TEXT,
                intent_sha256 TEXT NOT NULL,
                status TEXT NOT NULL,
                error_code TEXT,
                reason TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create audit table: {}", e)))?;

        info!("Postgres audit sink ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn write(&self, record: &AuditRecord) -> Result<()> {
        let (error_code, reason) = outcome_columns(&record.outcome);
        let context = record.context.as_ref().map(|c| c.to_string());

        sqlx::query(
            "INSERT INTO ai_sql_audit (
                audit_id, template_id, parameters, user_role, context, generated_sql,
                intent_sha256, status, error_code, reason, created_at
            ) VALUES ($1, $2, CAST($3 AS JSONB), $4, CAST($5 AS JSONB), $6, $7, $8, $9, $10, $11)
            ON CONFLICT (audit_id) DO NOTHING",
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
