pub mod use_cases;

pub use use_cases::audit_logger::{AuditLogger, AuditLoggerConfig, AuditSink, InMemoryAuditSink};
pub use use_cases::certification_gateway::CertificationGateway;
pub use use_cases::intent_resolver::IntentResolver;
pub use use_cases::template_registry::TemplateRegistry;
