pub mod audit_postgres;
pub mod audit_sqlite;
