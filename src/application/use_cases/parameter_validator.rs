//! Parameter Validator for certified templates
//!
//! Checks caller-supplied parameters against a template's declared contract:
//! - Required presence
//! - Type check and coercion (dates normalized to YYYY-MM-DD, whole
//!   numbers for integer-only parameters)
//! - Inclusive min/max ranges (value for numbers, length for strings/arrays)
//! - Enum membership
//! - Whole-value pattern match
//!
//! Validation is fail-fast in declared parameter order. Parameters the
//! template does not declare are dropped and never reach SQL.

use crate::domain::certification::ValidatedParameters;
use crate::domain::error::CertificationError;
use crate::domain::template::{ParamType, ParameterSpec, Template, ValidationRules};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Map, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";

type ValidationResult<T> = std::result::Result<T, CertificationError>;

/// Validate raw request parameters against one template.
pub fn validate_parameters(
    template: &Template,
    provided: &Map<String, Value>,
) -> ValidationResult<ValidatedParameters> {
    let mut validated = ValidatedParameters::new();
    let mut never_supplied: Vec<&ParameterSpec> = Vec::new();

    for spec in template.parameters() {
        match provided.get(&spec.name) {
            None => {
                if spec.required {
                    return Err(missing(spec));
                }
                never_supplied.push(spec);
            }
            Some(Value::Null) if spec.required => return Err(missing(spec)),
            Some(value) if !spec.required && is_blank(value) => {
                // Supplied but empty: no default, and a positional slot
                // cannot be left without a value.
                if template.is_positional(&spec.name) {
                    return Err(type_mismatch(spec));
                }
            }
            Some(value) => {
                let coerced = check_value(spec, template.pattern_for(&spec.name), value)?;
                validated.insert(&spec.name, coerced);
            }
        }
    }

    for spec in never_supplied {
        if let Some(default) = &spec.default {
            validated.insert(&spec.name, default.clone());
        }
    }

    Ok(validated)
}

/// Type-check, coerce and rule-check a single present value.
pub(crate) fn check_value(
    spec: &ParameterSpec,
    pattern: Option<&Regex>,
    value: &Value,
) -> ValidationResult<Value> {
    let coerced = match (spec.param_type, value) {
        (ParamType::Number, Value::Number(_)) => value.clone(),
        (ParamType::String, Value::String(_)) => value.clone(),
        (ParamType::Date, Value::String(raw)) => {
            let normalized = normalize_date(raw).ok_or_else(|| CertificationError::InvalidDate {
                name: spec.name.clone(),
            })?;
            Value::String(normalized)
        }
        (ParamType::Array, Value::Array(items))
            if !items.is_empty() && items.iter().all(|i| i.is_string() || i.is_number()) =>
        {
            value.clone()
        }
        _ => return Err(type_mismatch(spec)),
    };

    let coerced = match spec.rules() {
        Some(rules) if rules.integer => as_integer(spec, coerced)?,
        _ => coerced,
    };

    if let Some(rules) = spec.rules() {
        check_range(spec, rules, &coerced)?;
        check_enum(spec, rules, &coerced)?;
    }

    if let Some(pattern) = pattern {
        check_pattern(spec, pattern, &coerced)?;
    }

    Ok(coerced)
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp; the latter is reduced to
/// its UTC calendar date.
pub fn normalize_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Some(date.format(DATE_FORMAT).to_string());
    }

    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive().format(DATE_FORMAT).to_string())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// `50` and `50.0` pass as `50`; `50.5` does not.
fn as_integer(spec: &ParameterSpec, value: Value) -> ValidationResult<Value> {
    if !value.is_number() || value.is_i64() || value.is_u64() {
        return Ok(value);
    }

    match value.as_f64() {
        Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(Value::from(v as i64)),
        _ => Err(CertificationError::TypeMismatch {
            name: spec.name.clone(),
            expected: "a whole number".to_string(),
        }),
    }
}

fn check_range(spec: &ParameterSpec, rules: &ValidationRules, value: &Value) -> ValidationResult<()> {
    let (measured, subject) = match (spec.param_type, value) {
        (ParamType::Number, Value::Number(n)) => match n.as_f64() {
            Some(v) => (v, "must be"),
            None => return Err(type_mismatch(spec)),
        },
        (ParamType::String, Value::String(s)) => (s.chars().count() as f64, "length must be"),
        (ParamType::Array, Value::Array(items)) => (items.len() as f64, "length must be"),
        _ => return Ok(()),
    };

    if let Some(min) = rules.min {
        if measured < min {
            return Err(CertificationError::OutOfRange {
                name: spec.name.clone(),
                detail: format!("{} >= {}", subject, min),
            });
        }
    }

    if let Some(max) = rules.max {
        if measured > max {
            return Err(CertificationError::OutOfRange {
                name: spec.name.clone(),
                detail: format!("{} <= {}", subject, max),
            });
        }
    }

    Ok(())
}

fn check_enum(spec: &ParameterSpec, rules: &ValidationRules, value: &Value) -> ValidationResult<()> {
    let Some(allowed) = rules.allowed.as_ref().filter(|a| !a.is_empty()) else {
        return Ok(());
    };

    let is_member = |candidate: &Value| allowed.iter().any(|a| values_equal(a, candidate));
    let all_members = match value {
        Value::Array(items) => items.iter().all(is_member),
        other => is_member(other),
    };

    if all_members {
        Ok(())
    } else {
        Err(CertificationError::InvalidEnum {
            name: spec.name.clone(),
            allowed: allowed.iter().map(display_value).collect(),
        })
    }
}

fn check_pattern(spec: &ParameterSpec, pattern: &Regex, value: &Value) -> ValidationResult<()> {
    let matches = match value {
        Value::String(s) => pattern.is_match(s),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .all(|s| pattern.is_match(s)),
        _ => true,
    };

    if matches {
        Ok(())
    } else {
        Err(CertificationError::PatternMismatch {
            name: spec.name.clone(),
        })
    }
}

/// Numbers compare by value so `1` and `1.0` are the same enum member.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn display_value(value: &Value) -> String {
    value
        .as_str()
        .map(ToString::to_string)
        .unwrap_or_else(|| value.to_string())
}

fn missing(spec: &ParameterSpec) -> CertificationError {
    CertificationError::MissingParameter {
        name: spec.name.clone(),
    }
}

fn type_mismatch(spec: &ParameterSpec) -> CertificationError {
    CertificationError::TypeMismatch {
        name: spec.name.clone(),
        expected: spec.param_type.expectation().to_string(),
    }
}
