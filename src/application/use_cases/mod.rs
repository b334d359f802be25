pub mod audit_logger;
pub mod certification_gateway;
pub mod clause_assembler;
pub mod intent_resolver;
pub mod parameter_validator;
pub mod statement_guard;
pub mod template_registry;
