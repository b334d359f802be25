//! Clause Assembler
//!
//! Renders a vetted template with validated parameters into final SQL text.
//! Positional placeholders and filter tokens are substituted in a single
//! pass, so a rendered value is never re-scanned for markers.

use crate::domain::certification::ValidatedParameters;
use crate::domain::template::Template;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// `$n`, or a filter token together with the whitespace before it so an
/// unapplied filter leaves no gap behind.
static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(\d+)|\s*\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap()
});

/// Build the certified SQL. Infallible for parameters produced by the
/// validator against the same template.
pub fn assemble_sql(template: &Template, params: &ValidatedParameters) -> String {
    let collapsed = WHITESPACE.replace_all(template.sql().trim(), " ");

    MARKER
        .replace_all(&collapsed, |caps: &Captures| {
            if let Some(slot) = caps.get(1) {
                render_positional(template, params, slot.as_str())
            } else if let Some(token) = caps.get(2) {
                render_filter(template, params, token.as_str())
            } else {
                String::new()
            }
        })
        .trim()
        .to_string()
}

fn render_positional(template: &Template, params: &ValidatedParameters, slot: &str) -> String {
    slot.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| template.positional_parameters().get(i))
        .and_then(|name| params.get(name))
        .map(render_literal)
        .unwrap_or_else(|| "NULL".to_string())
}

fn render_filter(template: &Template, params: &ValidatedParameters, token: &str) -> String {
    let Some(binding) = template.filter_for_token(token) else {
        return String::new();
    };

    match params.get(&binding.parameter) {
        Some(value @ Value::Array(_)) => {
            format!(" AND {} IN {}", binding.column, render_literal(value))
        }
        Some(value) => format!(" AND {} = {}", binding.column, render_literal(value)),
        None => String::new(),
    }
}

/// SQL literal for a validated value. Dates are already `YYYY-MM-DD` strings
/// at this point, so they render like any other string.
fn render_literal(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_literal).collect();
            format!("({})", rendered.join(", "))
        }
        Value::Bool(b) => b.to_string().to_uppercase(),
        Value::Null | Value::Object(_) => "NULL".to_string(),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
