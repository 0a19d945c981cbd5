//! Desired-state validation.
//!
//! This module checks a desired configuration against a [`ResourceDescriptor`]
//! before any request is built, so that problems surface as diagnostics
//! pointing at the offending attribute instead of as API errors.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_http::schema::{FieldSpec, ResourceDescriptor};
//! use hemmer_provider_http::validation::validate;
//! use serde_json::json;
//!
//! let descriptor = ResourceDescriptor::new("project", "/projects")
//!     .with_field(FieldSpec::string("name").required())
//!     .with_field(FieldSpec::integer("replicas"));
//!
//! let diagnostics = validate(&descriptor, &json!({"name": "demo", "replicas": 2}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&descriptor, &json!({"name": "demo", "replicas": "two"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("replicas".to_string()));
//! ```

use serde_json::Value;

use crate::diagnose::field_hint;
use crate::reconcile::MASKED_SENTINEL;
use crate::schema::{Diagnostic, DiagnosticSeverity, FieldKind, FieldSpec, ResourceDescriptor};

/// Validate a desired configuration.
///
/// # Validation Rules
///
/// - The configuration must be an object (null is treated as empty)
/// - Required fields must be present and non-null
/// - Computed fields are skipped; setting one is a warning
/// - Values must match the field kind
/// - Enumerated fields must use one of the allowed values
/// - Unknown attributes are warnings
pub fn validate(descriptor: &ResourceDescriptor, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => {
            for field in descriptor.fields.iter().filter(|f| f.required) {
                diagnostics.push(missing_required(field));
            }
            return diagnostics;
        },
        _ => {
            diagnostics.push(
                Diagnostic::error(format!("Expected object for resource '{}'", descriptor.kind))
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    for field in &descriptor.fields {
        validate_field(field, obj.get(&field.name), &mut diagnostics);
    }

    for key in obj.keys() {
        if descriptor.field(key).is_none() {
            diagnostics.push(
                Diagnostic::warning(format!("Unknown attribute '{}'", key))
                    .with_detail(format!(
                        "Resource '{}' has no attribute '{}'; it will be ignored",
                        descriptor.kind, key
                    ))
                    .with_attribute(key.as_str()),
            );
        }
    }

    diagnostics
}

/// Validate an update: everything [`validate`] checks, plus a warning for
/// each immutable field whose desired value differs from the prior state.
pub fn validate_update(
    descriptor: &ResourceDescriptor,
    prior: &Value,
    desired: &Value,
) -> Vec<Diagnostic> {
    let mut diagnostics = validate(descriptor, desired);

    for field in descriptor.fields.iter().filter(|f| f.is_immutable()) {
        let before = prior.get(&field.name).filter(|v| !v.is_null());
        let after = desired.get(&field.name).filter(|v| !v.is_null());
        if let (Some(before), Some(after)) = (before, after) {
            if before != after {
                diagnostics.push(
                    Diagnostic::warning(format!(
                        "Attribute '{}' cannot be changed after creation",
                        field.name
                    ))
                    .with_detail(
                        "The existing value is kept. Recreate the resource to apply this change.",
                    )
                    .with_attribute(field.name.as_str()),
                );
            }
        }
    }

    diagnostics
}

/// Validate, returning Ok if there are no error diagnostics.
///
/// Warnings alone do not fail validation.
pub fn validate_result(descriptor: &ResourceDescriptor, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(descriptor, value);
    if diagnostics.iter().any(Diagnostic::is_error) {
        Err(diagnostics)
    } else {
        Ok(())
    }
}

/// Check if a desired configuration has no error diagnostics.
pub fn is_valid(descriptor: &ResourceDescriptor, value: &Value) -> bool {
    validate_result(descriptor, value).is_ok()
}

fn validate_field(field: &FieldSpec, value: Option<&Value>, diagnostics: &mut Vec<Diagnostic>) {
    let value = match value {
        None | Some(Value::Null) => {
            if field.required {
                diagnostics.push(missing_required(field));
            }
            return;
        },
        Some(v) => v,
    };

    if field.computed {
        diagnostics.push(
            Diagnostic::warning(format!("Attribute '{}' is computed", field.name))
                .with_detail("The value is set by the server; the configured value is ignored")
                .with_attribute(field.name.as_str()),
        );
        return;
    }

    let type_ok = match field.kind {
        FieldKind::String => value.is_string(),
        FieldKind::Integer => is_int64(value),
        FieldKind::Bool => value.is_boolean(),
        FieldKind::StringList => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
        FieldKind::StringMap => value
            .as_object()
            .is_some_and(|entries| entries.values().all(Value::is_string)),
    };
    if !type_ok {
        diagnostics.push(type_error(&field.name, field.kind.type_name(), value));
        return;
    }

    if !field.allowed_values.is_empty() {
        if let Some(s) = value.as_str() {
            if !field.allowed_values.iter().any(|allowed| allowed == s) {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid value for attribute '{}'", field.name))
                        .with_detail(format!(
                            "Got \"{}\"; expected one of: {}",
                            s,
                            field.allowed_values.join(", ")
                        ))
                        .with_attribute(field.name.as_str()),
                );
            }
        }
    }

    if field.sensitive && contains_sentinel(value) {
        diagnostics.push(
            Diagnostic::warning(format!(
                "Attribute '{}' contains a masked placeholder",
                field.name
            ))
            .with_detail(format!(
                "\"{}\" is what the server returns in place of secrets; set the real value",
                MASKED_SENTINEL
            ))
            .with_attribute(field.name.as_str()),
        );
    }
}

fn contains_sentinel(value: &Value) -> bool {
    match value {
        Value::String(s) => s == MASKED_SENTINEL,
        Value::Object(entries) => entries.values().any(contains_sentinel),
        _ => false,
    }
}

fn missing_required(field: &FieldSpec) -> Diagnostic {
    Diagnostic::error(format!("Missing required attribute '{}'", field.name))
        .with_detail(format!(
            "This attribute is required and must be provided ({})",
            field_hint(&field.name)
        ))
        .with_attribute(field.name.as_str())
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.as_f64()
                    .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        )),
        attribute: Some(path.to_string()),
    }
}
