use crate::application::use_cases::audit_logger::AuditLogger;
use crate::application::use_cases::certification_gateway::CertificationGateway;
use crate::application::use_cases::template_registry::TemplateRegistry;
use std::sync::Arc;

/// Process-wide services, built once by bootstrap and shared with handlers.
pub struct AppState {
    pub gateway: CertificationGateway,
    pub registry: Arc<TemplateRegistry>,
    pub audit: Arc<AuditLogger>,
}
