use std::sync::Arc;

use tracing::{info, warn};

use crate::application::use_cases::audit_logger::{
    AuditLogger, AuditLoggerConfig, AuditSink, InMemoryAuditSink,
};
use crate::application::use_cases::certification_gateway::CertificationGateway;
use crate::application::use_cases::intent_resolver::IntentResolver;
use crate::application::use_cases::template_registry::TemplateRegistry;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::catalog::{builtin_catalog, load_catalog};
use crate::infrastructure::config::{AuditConfig, AuditSinkKind, CertifierConfig};
use crate::infrastructure::db::audit_postgres::PgAuditSink;
use crate::infrastructure::db::audit_sqlite::SqliteAuditSink;
use crate::interfaces::state::AppState;

/// Build every shared service. Any template or sink problem aborts startup.
pub async fn setup(config: &CertifierConfig) -> Result<Arc<AppState>> {
    let catalog = match &config.templates_path {
        Some(path) => load_catalog(path)?,
        None => builtin_catalog(),
    };

    let registry = Arc::new(TemplateRegistry::from_definitions(catalog.templates)?);
    let resolver = IntentResolver::new(registry.clone(), catalog.intents)?;

    let sink = build_sink(&config.audit).await?;
    info!(sink = sink.name(), audit_denials = config.audit.audit_denials, "Audit sink ready");

    let audit = Arc::new(AuditLogger::new(
        sink,
        AuditLoggerConfig {
            write_timeout: config.audit.write_timeout(),
            retry_queue_capacity: config.audit.retry_queue_capacity,
            audit_denials: config.audit.audit_denials,
        },
    ));

    let gateway = CertificationGateway::new(registry.clone(), resolver, audit.clone());

    Ok(Arc::new(AppState {
        gateway,
        registry,
        audit,
    }))
}

async fn build_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>> {
    let url = || {
        config
            .database_url
            .as_deref()
            .ok_or_else(|| AppError::Config("audit.database_url is required".to_string()))
    };

    let sink: Arc<dyn AuditSink> = match config.sink {
        AuditSinkKind::Memory => {
            warn!(
                capacity = config.memory_capacity,
                "Audit records are kept in memory only and are lost on restart"
            );
            Arc::new(InMemoryAuditSink::with_capacity(config.memory_capacity))
        }
        AuditSinkKind::Sqlite => Arc::new(SqliteAuditSink::init(url()?).await?),
        AuditSinkKind::Postgres => Arc::new(PgAuditSink::init(url()?).await?),
    };
    Ok(sink)
}
