use std::cmp::Ordering;

use listkit_security::{FieldFilter, Filter, FilterOp};
use serde_json::Value;

use crate::args::{OrderBy, SortOrder};
use crate::write::Item;

/// Evaluate a where-clause against a stored row. Missing columns read as `null`.
pub fn matches(filter: &Filter, row: &Item) -> bool {
    match filter {
        Filter::Field(f) => matches_field(f, row.get(f.field()).unwrap_or(&Value::Null)),
        Filter::All(filters) => filters.iter().all(|f| matches(f, row)),
        Filter::Any(filters) => filters.iter().any(|f| matches(f, row)),
        Filter::Not(inner) => !matches(inner, row),
    }
}

fn matches_field(filter: &FieldFilter, value: &Value) -> bool {
    match filter.op() {
        FilterOp::Equals(v) => loose_eq(value, v),
        FilterOp::Not(v) => !loose_eq(value, v),
        FilterOp::In(vs) => vs.iter().any(|v| loose_eq(value, v)),
        FilterOp::NotIn(vs) => !vs.iter().any(|v| loose_eq(value, v)),
        FilterOp::Lt(v) => compare(value, v) == Some(Ordering::Less),
        FilterOp::Lte(v) => matches!(compare(value, v), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Gt(v) => compare(value, v) == Some(Ordering::Greater),
        FilterOp::Gte(v) => matches!(
            compare(value, v),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Contains(s) => value.as_str().is_some_and(|x| x.contains(s.as_str())),
        FilterOp::StartsWith(s) => value.as_str().is_some_and(|x| x.starts_with(s.as_str())),
        FilterOp::EndsWith(s) => value.as_str().is_some_and(|x| x.ends_with(s.as_str())),
    }
}

/// Equality that treats `1` and `1.0` as the same number.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Ordering between two values of the same JSON kind; `None` across kinds.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Sort rows in place. `null` sorts before any value.
pub fn sort(rows: &mut [Item], order_by: &[OrderBy]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for order in order_by {
            let av = a.get(&order.field).unwrap_or(&Value::Null);
            let bv = b.get(&order.field).unwrap_or(&Value::Null);
            let ord = match (av.is_null(), bv.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => compare(av, bv).unwrap_or(Ordering::Equal),
            };
            let ord = match order.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}
