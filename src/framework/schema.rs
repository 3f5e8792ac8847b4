//! Schema model for the provider, its data sources and its resources.
//!
//! A [`Schema`] describes the attributes a block accepts and produces. It is
//! serialized verbatim for `GetProviderSchema`, and it drives configuration
//! validation, sensitive-value redaction and plan computation.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use super::diag::{Diagnostic, Diagnostics};
use super::Object;

/// Placeholder written in place of sensitive values.
pub const REDACTED: &str = "(sensitive value)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Bool,
    Int64,
}

impl AttributeType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            AttributeType::String => value.is_string(),
            AttributeType::Bool => value.is_boolean(),
            AttributeType::Int64 => value.as_i64().is_some(),
        }
    }

    /// The host's name for the type.
    pub fn name(self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Bool => "bool",
            AttributeType::Int64 => "number",
        }
    }
}

/// Cross-attribute rules evaluated against the whole configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "attributes", rename_all = "snake_case")]
pub enum Validator {
    /// Exactly one of the named attributes must be set.
    ExactlyOneOf(Vec<String>),
}

impl Validator {
    pub fn exactly_one_of(names: &[&str]) -> Self {
        Validator::ExactlyOneOf(names.iter().map(|n| n.to_string()).collect())
    }

    fn validate(
        &self,
        owner: &str,
        config: &Object,
        unknown: &BTreeSet<String>,
        diags: &mut Diagnostics,
    ) {
        match self {
            Validator::ExactlyOneOf(names) => {
                let set = names
                    .iter()
                    .filter(|n| is_set(config, n) || unknown.contains(n.as_str()))
                    .count();
                let listed = format!("[{}]", names.join(","));
                if set == 0 {
                    diags.push(
                        Diagnostic::error(
                            "Missing Attribute Configuration",
                            format!("Exactly one of these attributes must be configured: {listed}"),
                        )
                        .with_attribute(owner),
                    );
                } else if set > 1 {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Combination",
                            format!(
                                "{set} attributes specified when one (and only one) of {listed} is required"
                            ),
                        )
                        .with_attribute(owner),
                    );
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub kind: AttributeType,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Validator>,
}

impl Attribute {
    pub fn new(kind: AttributeType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            validators: Vec::new(),
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new(AttributeType::String, description)
    }

    pub fn bool(description: impl Into<String>) -> Self {
        Self::new(AttributeType::Bool, description)
    }

    pub fn int64(description: impl Into<String>) -> Self {
        Self::new(AttributeType::Int64, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Set only by the provider, never by configuration.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.required && !self.optional
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    pub version: i64,
    pub description: String,
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            version: 0,
            description: description.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, attribute: Attribute) -> Self {
        self.attributes.insert(name.to_string(), attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Checks a configuration object against this schema.
    pub fn validate(&self, config: &Object) -> Diagnostics {
        self.validate_partial(config, &BTreeSet::new())
    }

    /// Validates a configuration some of whose attributes are not known
    /// yet. Unknown attributes count as set but skip the type check.
    pub fn validate_partial(&self, config: &Object, unknown: &BTreeSet<String>) -> Diagnostics {
        let mut diags = Diagnostics::default();

        for name in unknown {
            match self.attributes.get(name) {
                None => diags.push(unsupported(name)),
                Some(attribute) if attribute.is_computed_only() => diags.push(read_only(name)),
                Some(_) => {}
            }
        }

        for (name, value) in config {
            let Some(attribute) = self.attributes.get(name) else {
                diags.push(unsupported(name));
                continue;
            };
            if value.is_null() {
                continue;
            }
            if attribute.is_computed_only() {
                diags.push(read_only(name));
            } else if !attribute.kind.accepts(value) {
                diags.push(
                    Diagnostic::error(
                        "Incorrect attribute value type",
                        format!("Inappropriate value for attribute {name:?}: {} required.", attribute.kind.name()),
                    )
                    .with_attribute(name),
                );
            }
        }

        for (name, attribute) in &self.attributes {
            if attribute.required && !is_set(config, name) && !unknown.contains(name) {
                diags.push(
                    Diagnostic::error(
                        "Missing Configuration for Required Attribute",
                        format!("Must set a configuration value for the {name} attribute as the provider has marked it as required."),
                    )
                    .with_attribute(name),
                );
            }
            for validator in &attribute.validators {
                validator.validate(name, config, unknown, &mut diags);
            }
        }

        diags
    }

    /// Returns a copy of `object` with every set sensitive value masked.
    pub fn redact(&self, object: &Object) -> Object {
        object
            .iter()
            .map(|(name, value)| {
                let sensitive = self.attribute(name).is_some_and(|a| a.sensitive);
                let value = if sensitive && !value.is_null() {
                    Value::String(REDACTED.to_string())
                } else {
                    value.clone()
                };
                (name.clone(), value)
            })
            .collect()
    }
}

fn unsupported(name: &str) -> Diagnostic {
    Diagnostic::error(
        "Unsupported argument",
        format!("An argument named {name:?} is not expected here."),
    )
    .with_attribute(name)
}

fn read_only(name: &str) -> Diagnostic {
    Diagnostic::error(
        "Invalid Configuration for Read-Only Attribute",
        format!("Cannot set value for this attribute as the provider has marked it as read-only. Remove the configuration line setting the value: {name}"),
    )
    .with_attribute(name)
}

/// An attribute counts as set when it is present and not null.
pub fn is_set(object: &Object, name: &str) -> bool {
    object.get(name).is_some_and(|v| !v.is_null())
}
