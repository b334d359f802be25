use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a certification request is denied.
///
/// Every variant except `Internal` is a caller-repairable denial and ends up
/// as an `approved: false` result with HTTP 200.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum CertificationError {
    #[error("No approved SQL template matches your request")]
    NoMatchingTemplate,
    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },
    #[error("Parameter {name} must be {expected}")]
    TypeMismatch { name: String, expected: String },
    #[error("Parameter {name} must be a valid date (YYYY-MM-DD)")]
    InvalidDate { name: String },
    #[error("Parameter {name} {detail}")]
    OutOfRange { name: String, detail: String },
    #[error("Parameter {name} must be one of: {}", allowed.join(", "))]
    InvalidEnum { name: String, allowed: Vec<String> },
    #[error("Parameter {name} contains characters outside its allowed pattern")]
    PatternMismatch { name: String },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CertificationError {
    /// Stable machine-readable code, surfaced as `error_code`.
    pub fn code(&self) -> &'static str {
        match self {
            CertificationError::NoMatchingTemplate => "no_matching_template",
            CertificationError::MissingParameter { .. } => "missing_parameter",
            CertificationError::TypeMismatch { .. } => "type_mismatch",
            CertificationError::InvalidDate { .. } => "invalid_date",
            CertificationError::OutOfRange { .. } => "out_of_range",
            CertificationError::InvalidEnum { .. } => "invalid_enum",
            CertificationError::PatternMismatch { .. } => "pattern_mismatch",
            CertificationError::Internal(_) => "internal_error",
        }
    }

    /// Name of the offending parameter, if the denial is about one.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            CertificationError::MissingParameter { name }
            | CertificationError::TypeMismatch { name, .. }
            | CertificationError::InvalidDate { name }
            | CertificationError::OutOfRange { name, .. }
            | CertificationError::InvalidEnum { name, .. }
            | CertificationError::PatternMismatch { name } => Some(name),
            CertificationError::NoMatchingTemplate | CertificationError::Internal(_) => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.parameter().is_some()
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Certification(#[from] CertificationError),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_message_names_parameter() {
        let err = CertificationError::MissingParameter {
            name: "baseline_end".to_string(),
        };
        assert_eq!(err.to_string(), "Missing required parameter: baseline_end");
        assert_eq!(err.code(), "missing_parameter");
        assert_eq!(err.parameter(), Some("baseline_end"));
    }

    #[test]
    fn test_invalid_enum_lists_allowed_values() {
        let err = CertificationError::InvalidEnum {
            name: "channel".to_string(),
            allowed: vec!["online".to_string(), "store".to_string()],
        };
        assert_eq!(err.to_string(), "Parameter channel must be one of: online, store");
    }

    #[test]
    fn test_no_match_is_not_a_validation_error() {
        assert!(!CertificationError::NoMatchingTemplate.is_validation());
        assert!(CertificationError::InvalidDate {
            name: "start_date".to_string()
        }
        .is_validation());
    }

    #[test]
    fn test_app_error_wraps_certification_error() {
        let err: AppError = CertificationError::Internal("registry corrupted".to_string()).into();
        assert_eq!(err.to_string(), "Internal error: registry corrupted");
    }
}
