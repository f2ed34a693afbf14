//! Where-clause compiler.
//!
//! Compiles a client-supplied where object into a typed [`Filter`].
//!
//! ## Accepted shape
//!
//! | Input | Result |
//! |-------|--------|
//! | `{ "title": "x" }` | `title = "x"` |
//! | `{ "title": null }` | `title = null` |
//! | `{ "views": { "gt": 3, "lte": 10 } }` | `views > 3 AND views <= 10` |
//! | `{ "AND": [..] }` / `{ "AND": {..} }` | conjunction |
//! | `{ "OR": [..] }` | disjunction |
//! | `{ "NOT": [..] }` / `{ "NOT": {..} }` | negated conjunction |
//! | several keys | conjunction of each key |
//!
//! Anything else (unknown operators, array literals outside `in`/`notIn`,
//! non-object roots) is rejected rather than guessed at.

use serde_json::{Map, Value};

use crate::filter::{Filter, FilterOp};

/// Error during where-clause compilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterParseError {
    #[error("where clause must be an object, got: {found}")]
    NotAnObject { found: String },

    #[error("unknown filter operator '{op}' on field '{field}'")]
    UnknownOperator { field: String, op: String },

    #[error("invalid operand for '{op}' on field '{field}': {reason}")]
    InvalidOperand {
        field: String,
        op: String,
        reason: String,
    },

    #[error("'{key}' expects {expected}")]
    InvalidCombinator { key: String, expected: &'static str },
}

impl Filter {
    /// Compile a where object into a filter.
    ///
    /// # Errors
    ///
    /// Returns [`FilterParseError`] if the object uses an unsupported shape.
    pub fn from_json(value: &Value) -> Result<Filter, FilterParseError> {
        compile_where(value).inspect_err(|e| {
            tracing::debug!(error = %e, "rejected where clause");
        })
    }
}

/// Compile a where object into a [`Filter`].
///
/// # Errors
///
/// Returns [`FilterParseError`] if the object uses an unsupported shape.
pub fn compile_where(value: &Value) -> Result<Filter, FilterParseError> {
    let Value::Object(obj) = value else {
        return Err(FilterParseError::NotAnObject {
            found: value.to_string(),
        });
    };

    let mut parts = Vec::with_capacity(obj.len());
    for (key, val) in obj {
        match key.as_str() {
            "AND" if val.is_object() => parts.push(compile_where(val)?),
            "AND" => parts.push(Filter::All(compile_list(key, val, true)?)),
            "OR" => parts.push(Filter::Any(compile_list(key, val, false)?)),
            "NOT" => parts.push(conjoin(compile_list(key, val, true)?).negate()),
            field => parts.extend(compile_field(field, val)?),
        }
    }

    Ok(conjoin(parts))
}

fn conjoin(mut parts: Vec<Filter>) -> Filter {
    if parts.len() == 1 {
        return parts.remove(0);
    }
    Filter::All(parts)
}

/// Compile the operand of a combinator. `AND`/`NOT` also accept a single object.
fn compile_list(key: &str, val: &Value, allow_object: bool) -> Result<Vec<Filter>, FilterParseError> {
    match val {
        Value::Array(items) => items.iter().map(compile_where).collect(),
        Value::Object(_) if allow_object => Ok(vec![compile_where(val)?]),
        _ => Err(FilterParseError::InvalidCombinator {
            key: key.to_owned(),
            expected: if allow_object {
                "an object or an array of objects"
            } else {
                "an array of objects"
            },
        }),
    }
}

fn compile_field(field: &str, val: &Value) -> Result<Vec<Filter>, FilterParseError> {
    match val {
        Value::Object(ops) => compile_ops(field, ops),
        Value::Array(_) => Err(FilterParseError::InvalidOperand {
            field: field.to_owned(),
            op: "equals".to_owned(),
            reason: "array literals are only valid under 'in' or 'notIn'".to_owned(),
        }),
        scalar => Ok(vec![Filter::field(field, FilterOp::Equals(scalar.clone()))]),
    }
}

fn compile_ops(field: &str, ops: &Map<String, Value>) -> Result<Vec<Filter>, FilterParseError> {
    let mut out = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        let compiled = match op.as_str() {
            "equals" => FilterOp::Equals(scalar_operand(field, op, operand)?),
            "not" => FilterOp::Not(scalar_operand(field, op, operand)?),
            "lt" => FilterOp::Lt(scalar_operand(field, op, operand)?),
            "lte" => FilterOp::Lte(scalar_operand(field, op, operand)?),
            "gt" => FilterOp::Gt(scalar_operand(field, op, operand)?),
            "gte" => FilterOp::Gte(scalar_operand(field, op, operand)?),
            "in" => FilterOp::In(array_operand(field, op, operand)?),
            "notIn" => FilterOp::NotIn(array_operand(field, op, operand)?),
            "contains" => FilterOp::Contains(string_operand(field, op, operand)?),
            "startsWith" => FilterOp::StartsWith(string_operand(field, op, operand)?),
            "endsWith" => FilterOp::EndsWith(string_operand(field, op, operand)?),
            _ => {
                return Err(FilterParseError::UnknownOperator {
                    field: field.to_owned(),
                    op: op.clone(),
                });
            }
        };
        out.push(Filter::field(field, compiled));
    }
    Ok(out)
}

fn invalid(field: &str, op: &str, reason: &str) -> FilterParseError {
    FilterParseError::InvalidOperand {
        field: field.to_owned(),
        op: op.to_owned(),
        reason: reason.to_owned(),
    }
}

fn scalar_operand(field: &str, op: &str, operand: &Value) -> Result<Value, FilterParseError> {
    match operand {
        Value::Array(_) | Value::Object(_) => Err(invalid(field, op, "expected a scalar")),
        v => Ok(v.clone()),
    }
}

fn array_operand(field: &str, op: &str, operand: &Value) -> Result<Vec<Value>, FilterParseError> {
    match operand {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(invalid(field, op, "expected an array")),
    }
}

fn string_operand(field: &str, op: &str, operand: &Value) -> Result<String, FilterParseError> {
    operand
        .as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| invalid(field, op, "expected a string"))
}
