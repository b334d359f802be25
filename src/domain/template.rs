use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Date,
    Array,
}

impl ParamType {
    /// Human-readable expectation used in type-mismatch denials.
    pub fn expectation(&self) -> &'static str {
        match self {
            ParamType::String => "a string",
            ParamType::Number => "a number",
            ParamType::Date => "a date string",
            ParamType::Array => "a non-empty array of strings or numbers",
        }
    }
}

/// Declarative checks applied after the type check.
///
/// `min`/`max` bound numeric values, or the length of strings and arrays.
/// `integer` restricts a number to whole values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub integer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(
        rename = "enum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed: Option<Vec<Value>>,
}

impl ValidationRules {
    /// Whether a string value is pinned to a known-safe shape.
    pub fn constrains_text(&self) -> bool {
        self.pattern.is_some() || self.allowed.as_ref().is_some_and(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRules>,
}

impl ParameterSpec {
    pub fn rules(&self) -> Option<&ValidationRules> {
        self.validation.as_ref()
    }
}

/// Binds a `{{token}}` in the template text to an optional parameter and
/// the column it filters on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterBinding {
    pub token: String,
    pub parameter: String,
    pub column: String,
}

/// A template as written in configuration, before load-time checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub sql: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub filters: Vec<FilterBinding>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// One routing rule: any keyword hit selects `template_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRule {
    pub category: String,
    pub keywords: Vec<String>,
    pub template_id: String,
}

/// Everything the registry and resolver are built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateCatalog {
    pub templates: Vec<TemplateDefinition>,
    #[serde(default)]
    pub intents: Vec<IntentRule>,
}

/// A vetted template. Only the registry constructs these.
#[derive(Debug, Clone)]
pub struct Template {
    definition: TemplateDefinition,
    patterns: HashMap<String, Regex>,
    positional: Vec<String>,
}

impl Template {
    pub(crate) fn from_parts(
        definition: TemplateDefinition,
        patterns: HashMap<String, Regex>,
        positional: Vec<String>,
    ) -> Self {
        Self {
            definition,
            patterns,
            positional,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn description(&self) -> &str {
        &self.definition.description
    }

    pub fn sql(&self) -> &str {
        &self.definition.sql
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.definition.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.definition.parameters.iter().find(|p| p.name == name)
    }

    pub fn filters(&self) -> &[FilterBinding] {
        &self.definition.filters
    }

    pub fn filter_for_token(&self, token: &str) -> Option<&FilterBinding> {
        self.definition.filters.iter().find(|f| f.token == token)
    }

    pub fn is_filter_parameter(&self, name: &str) -> bool {
        self.definition.filters.iter().any(|f| f.parameter == name)
    }

    pub fn scopes(&self) -> &[String] {
        &self.definition.scopes
    }

    /// Parameter names filling `$1..$n`, in slot order.
    pub fn positional_parameters(&self) -> &[String] {
        &self.positional
    }

    pub fn is_positional(&self, name: &str) -> bool {
        self.positional.iter().any(|p| p == name)
    }

    /// Anchored pattern compiled from the parameter's `pattern` rule.
    pub fn pattern_for(&self, name: &str) -> Option<&Regex> {
        self.patterns.get(name)
    }

    pub fn definition(&self) -> &TemplateDefinition {
        &self.definition
    }
}
