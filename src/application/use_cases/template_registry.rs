//! Template Registry
//!
//! Immutable set of vetted SQL templates, built once at startup. Every
//! template passes load-time checks before it can be certified against:
//! - Read-only, single-statement SQL
//! - Positional placeholders exactly `$1..$n` for the non-filter parameters
//! - Every `{{token}}` bound to exactly one optional filter parameter
//! - Every interpolated string/array parameter constrained by enum or pattern
//! - Every optional positional parameter carries a default that passes its rules
//!
//! Any failure aborts startup; there is no partial registry.

use crate::application::use_cases::parameter_validator::check_value;
use crate::application::use_cases::statement_guard::verify_read_only;
use crate::domain::error::{AppError, Result};
use crate::domain::template::{ParamType, Template, TemplateDefinition};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

pub(crate) static POSITIONAL_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d+)").unwrap());

pub(crate) static FILTER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

pub struct TemplateRegistry {
    templates: Vec<Template>,
    index: HashMap<String, usize>,
}

impl TemplateRegistry {
    /// Check and freeze a set of template definitions.
    pub fn from_definitions(definitions: Vec<TemplateDefinition>) -> Result<Self> {
        let mut templates = Vec::with_capacity(definitions.len());
        let mut index = HashMap::new();

        for definition in definitions {
            let template = compile_template(definition)?;
            if index.contains_key(template.id()) {
                return Err(AppError::Config(format!(
                    "Duplicate template id '{}'",
                    template.id()
                )));
            }
            debug!(
                template_id = template.id(),
                positional = template.positional_parameters().len(),
                filters = template.filters().len(),
                "Template registered"
            );
            index.insert(template.id().to_string(), templates.len());
            templates.push(template);
        }

        if templates.is_empty() {
            warn!("Template registry is empty; every certification will be denied");
        }

        info!(templates = templates.len(), "Template registry loaded");

        Ok(Self { templates, index })
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.index.get(id).map(|&i| &self.templates[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Templates in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn compile_template(mut definition: TemplateDefinition) -> Result<Template> {
    let id = definition.id.trim().to_string();
    if id.is_empty() {
        return Err(AppError::Config("Template id must not be empty".to_string()));
    }
    let fail = |msg: String| AppError::Config(format!("Template '{}': {}", id, msg));

    if definition.scopes.is_empty() || definition.scopes.iter().any(|s| s.trim().is_empty()) {
        return Err(fail("at least one non-empty scope is required".to_string()));
    }

    verify_read_only(&definition.sql).map_err(fail)?;

    let mut names = HashSet::new();
    for spec in &definition.parameters {
        if spec.name.trim().is_empty() {
            return Err(fail("parameter names must not be empty".to_string()));
        }
        if !names.insert(spec.name.as_str()) {
            return Err(fail(format!("duplicate parameter '{}'", spec.name)));
        }
    }

    // Filter bindings
    let mut bound_tokens = HashSet::new();
    let mut bound_params = HashSet::new();
    for filter in &definition.filters {
        if !bound_tokens.insert(filter.token.as_str()) {
            return Err(fail(format!("token '{}' is bound twice", filter.token)));
        }
        if !bound_params.insert(filter.parameter.as_str()) {
            return Err(fail(format!(
                "parameter '{}' is bound to more than one filter",
                filter.parameter
            )));
        }
        if !is_valid_identifier(&filter.column) {
            return Err(fail(format!("invalid filter column '{}'", filter.column)));
        }
        match definition.parameters.iter().find(|p| p.name == filter.parameter) {
            None => {
                return Err(fail(format!(
                    "filter '{}' references undeclared parameter '{}'",
                    filter.token, filter.parameter
                )))
            }
            Some(spec) if spec.required => {
                return Err(fail(format!(
                    "filter parameter '{}' must be optional",
                    spec.name
                )))
            }
            Some(_) => {}
        }
    }

    // Tokens present in the SQL text
    let sql_tokens: HashSet<&str> = FILTER_TOKEN
        .captures_iter(&definition.sql)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if definition.sql.matches("{{").count() != FILTER_TOKEN.find_iter(&definition.sql).count() {
        return Err(fail("malformed filter token".to_string()));
    }
    for token in &sql_tokens {
        if !bound_tokens.contains(token) {
            return Err(fail(format!("token '{{{{{}}}}}' has no filter binding", token)));
        }
    }
    for token in &bound_tokens {
        if !sql_tokens.contains(token) {
            return Err(fail(format!("filter token '{}' does not appear in the SQL", token)));
        }
    }

    // Positional slots: the non-filter parameters, in declared order
    let positional: Vec<String> = definition
        .parameters
        .iter()
        .filter(|p| !bound_params.contains(p.name.as_str()))
        .map(|p| p.name.clone())
        .collect();

    let mut slots = BTreeSet::new();
    for caps in POSITIONAL_PLACEHOLDER.captures_iter(&definition.sql) {
        let slot: usize = caps[1]
            .parse()
            .map_err(|_| fail(format!("invalid placeholder '${}'", &caps[1])))?;
        slots.insert(slot);
    }
    let expected: BTreeSet<usize> = (1..=positional.len()).collect();
    if slots != expected {
        return Err(fail(format!(
            "placeholders {:?} do not match the {} positional parameter(s) {:?}",
            slots,
            positional.len(),
            positional
        )));
    }

    // Patterns, interpolation safety, defaults
    let mut patterns = HashMap::new();
    for spec in definition.parameters.iter_mut() {
        if let Some(raw) = spec.rules().and_then(|r| r.pattern.as_ref()) {
            let compiled = Regex::new(&format!("^(?:{})$", raw))
                .map_err(|e| fail(format!("invalid pattern for '{}': {}", spec.name, e)))?;
            patterns.insert(spec.name.clone(), compiled);
        }

        let carries_text = matches!(spec.param_type, ParamType::String | ParamType::Array);
        let constrained = spec.rules().is_some_and(|r| r.constrains_text());
        // Every parameter value is rendered into the certified text.
        if carries_text && !constrained {
            return Err(fail(format!(
                "parameter '{}' is interpolated into SQL and must be constrained by enum or pattern",
                spec.name
            )));
        }

        if !spec.required && positional.contains(&spec.name) && spec.default.is_none() {
            return Err(fail(format!(
                "optional positional parameter '{}' needs a default",
                spec.name
            )));
        }

        if let Some(default) = spec.default.take() {
            let coerced = check_value(spec, patterns.get(&spec.name), &default)
                .map_err(|e| fail(format!("default rejected: {}", e)))?;
            spec.default = Some(coerced);
        }
    }

    definition.id = id;
    Ok(Template::from_parts(definition, patterns, positional))
}

/// Check if a string is a plain SQL identifier
fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
