pub mod catalog;

use crate::domain::error::Result;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

const CONFIG_PATH_VAR: &str = "CERTIFIER_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "certifier.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    #[default]
    Memory,
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_sink_url"))]
pub struct AuditConfig {
    pub sink: AuditSinkKind,
    pub database_url: Option<String>,
    #[validate(range(min = 1, max = 60000))]
    pub write_timeout_ms: u64,
    #[validate(range(min = 1, max = 100000))]
    pub retry_queue_capacity: usize,
    #[validate(range(min = 1, max = 3600))]
    pub flush_interval_secs: u64,
    /// Records kept by the `memory` sink before the oldest is evicted.
    #[validate(range(min = 1, max = 1000000))]
    pub memory_capacity: usize,
    pub audit_denials: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::Memory,
            database_url: None,
            write_timeout_ms: 2000,
            retry_queue_capacity: 1000,
            flush_interval_secs: 30,
            memory_capacity: 10_000,
            audit_denials: false,
        }
    }
}

impl AuditConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

fn validate_sink_url(config: &AuditConfig) -> std::result::Result<(), ValidationError> {
    let has_url = config
        .database_url
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty());

    match config.sink {
        AuditSinkKind::Memory => Ok(()),
        AuditSinkKind::Sqlite | AuditSinkKind::Postgres if has_url => Ok(()),
        _ => Err(ValidationError::new("database_url_required")),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CertifierConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub audit: AuditConfig,
    pub templates_path: Option<PathBuf>,
}

impl CertifierConfig {
    /// Defaults, then the TOML file named by `CERTIFIER_CONFIG` (or
    /// `certifier.toml`), then `CERTIFIER_*` environment variables.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_figment(Self::figment(Path::new(&path)))
    }

    pub fn figment(path: &Path) -> Figment {
        Self::defaults()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CERTIFIER_").split("__").ignore(&["config"]))
    }

    pub fn defaults() -> Figment {
        Figment::from(Serialized::defaults(CertifierConfig::default()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: CertifierConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }
}
