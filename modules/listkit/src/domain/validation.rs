//! Structural field validation.
//!
//! Every violation across every field is collected; nothing here fails on
//! the first problem. Relationship and virtual fields are exempt.

use listkit_db::Item;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::domain::Operation;
use crate::error::ValidationError;
use crate::schema::{DefaultValue, FieldDescriptor, FieldKind, ListDescriptor};

/// Validate `resolved` (the payload after `resolveInput`).
///
/// `raw` is the payload as sent; length rules on password fields read the
/// plain-text value from it since `resolved` holds the hash.
#[must_use]
pub fn validate(
    list: &ListDescriptor,
    operation: Operation,
    resolved: &Item,
    raw: &Item,
) -> ValidationError {
    let mut errors = ValidationError::default();
    for field in list.fields().filter(|f| f.is_scalar()) {
        let value = resolved.get(field.name());
        if operation == Operation::Update && value.is_none() {
            continue;
        }
        match value {
            Some(v) if !is_blank(v) => check_value(field, v, raw.get(field.name()), &mut errors),
            _ => {
                let required = field.validation().required
                    && (operation == Operation::Update || field.default().is_none());
                if required {
                    errors.push_field(field.name(), format!("{} is required", field.label()));
                }
            }
        }
    }
    errors
}

/// Value a field receives on create when the payload has none.
#[must_use]
pub fn default_for(field: &FieldDescriptor) -> Option<Value> {
    match field.default()? {
        DefaultValue::Value(v) => Some(v.clone()),
        DefaultValue::Now => OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .ok()
            .map(Value::String),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn check_value(field: &FieldDescriptor, value: &Value, raw: Option<&Value>, errors: &mut ValidationError) {
    let label = field.label();
    let rules = field.validation();
    let type_ok = match field.kind() {
        FieldKind::Text | FieldKind::Password | FieldKind::Select { .. } => value.is_string(),
        FieldKind::Integer => value.is_i64() || value.is_u64(),
        FieldKind::Decimal => value.is_number(),
        FieldKind::Checkbox => value.is_boolean(),
        FieldKind::Timestamp => value
            .as_str()
            .is_some_and(|s| OffsetDateTime::parse(s, &Rfc3339).is_ok()),
        FieldKind::Json | FieldKind::Relationship { .. } | FieldKind::Virtual => true,
    };
    if !type_ok {
        let type_name = field.kind().type_name();
        let article = if type_name.starts_with(['a', 'e', 'i', 'o', 'u']) { "an" } else { "a" };
        errors.push_field(field.name(), format!("{label} must be {article} {type_name}"));
        return;
    }

    match field.kind() {
        FieldKind::Text | FieldKind::Password => {
            let text = match (field.kind(), raw) {
                (FieldKind::Password, Some(Value::String(plain))) => plain.as_str(),
                _ => value.as_str().unwrap_or_default(),
            };
            let len = text.chars().count();
            if let Some(min) = rules.min_length
                && len < min
            {
                errors.push_field(
                    field.name(),
                    format!("{label} must be at least {min} characters"),
                );
            }
            if let Some(max) = rules.max_length
                && len > max
            {
                errors.push_field(
                    field.name(),
                    format!("{label} must be no longer than {max} characters"),
                );
            }
        }
        FieldKind::Integer | FieldKind::Decimal => {
            let n = value.as_f64().unwrap_or_default();
            if let Some(min) = rules.min
                && n < min
            {
                errors.push_field(field.name(), format!("{label} must be at least {}", number(min)));
            }
            if let Some(max) = rules.max
                && n > max
            {
                errors.push_field(field.name(), format!("{label} must be at most {}", number(max)));
            }
        }
        FieldKind::Select { options } => {
            if !value.as_str().is_some_and(|s| options.iter().any(|o| o == s)) {
                errors.push_field(
                    field.name(),
                    format!("{label} must be one of: {}", options.join(", ")),
                );
            }
        }
        _ => {}
    }
}

/// `3.0` -> `"3"`, `2.5` -> `"2.5"`.
fn number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}
