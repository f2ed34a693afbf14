use serde_json::{Map, Value};

/// Column names managed by persistence rather than by list schemas.
pub mod system_fields {
    /// Primary key.
    pub const ID: &str = "id";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";

    pub const ALL: &[&str] = &[ID, CREATED_AT, UPDATED_AT];

    #[must_use]
    pub fn is_system(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// A comparison applied to a single field.
///
/// Operand types are not checked here: a `Gt` against a string compares
/// lexically, against a number numerically. Engines decide how to coerce.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterOp {
    Equals(Value),
    Not(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
}

impl FilterOp {
    /// Wire name of the operator in the where-clause object.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::Equals(_) => "equals",
            Self::Not(_) => "not",
            Self::In(_) => "in",
            Self::NotIn(_) => "notIn",
            Self::Lt(_) => "lt",
            Self::Lte(_) => "lte",
            Self::Gt(_) => "gt",
            Self::Gte(_) => "gte",
            Self::Contains(_) => "contains",
            Self::StartsWith(_) => "startsWith",
            Self::EndsWith(_) => "endsWith",
        }
    }

    fn operand_json(&self) -> Value {
        match self {
            Self::Equals(v)
            | Self::Not(v)
            | Self::Lt(v)
            | Self::Lte(v)
            | Self::Gt(v)
            | Self::Gte(v) => v.clone(),
            Self::In(vs) | Self::NotIn(vs) => Value::Array(vs.clone()),
            Self::Contains(s) | Self::StartsWith(s) | Self::EndsWith(s) => Value::String(s.clone()),
        }
    }
}

/// A single predicate on a named field: `field <op> operand`.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: String,
    op: FilterOp,
}

impl FieldFilter {
    #[must_use]
    pub fn new(field: impl Into<String>, op: FilterOp) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    #[inline]
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[inline]
    #[must_use]
    pub fn op(&self) -> &FilterOp {
        &self.op
    }
}

/// A where-clause tree.
///
/// Used for client-supplied `where` arguments and for filter-valued access
/// results alike, so both can be merged with [`Filter::and`] before reaching
/// persistence.
///
/// - [`Filter::All`] is a conjunction; `All([])` matches every row.
/// - [`Filter::Any`] is a disjunction; `Any([])` matches no row.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Field(FieldFilter),
    All(Vec<Filter>),
    Any(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    // ── Constructors ────────────────────────────────────────────────

    #[must_use]
    pub fn field(field: impl Into<String>, op: FilterOp) -> Self {
        Self::Field(FieldFilter::new(field, op))
    }

    /// Equality filter (`field = value`).
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, FilterOp::Equals(value.into()))
    }

    /// Set membership filter (`field IN (values)`).
    #[must_use]
    pub fn r#in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::field(field, FilterOp::In(values))
    }

    /// Unique selector on the primary key.
    #[must_use]
    pub fn id(value: impl Into<Value>) -> Self {
        Self::eq(system_fields::ID, value)
    }

    #[must_use]
    pub fn all(filters: Vec<Filter>) -> Self {
        Self::All(filters)
    }

    #[must_use]
    pub fn any(filters: Vec<Filter>) -> Self {
        Self::Any(filters)
    }

    /// Match-everything filter.
    #[must_use]
    pub fn everything() -> Self {
        Self::All(Vec::new())
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    // ── Combinators ─────────────────────────────────────────────────

    /// Logical AND of two filters. Both constraints are always preserved,
    /// even when they reference the same field with disjoint values.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All(mut left), Self::All(right)) => {
                left.extend(right);
                Self::All(left)
            }
            (Self::All(mut left), other) => {
                left.push(other);
                Self::All(left)
            }
            (this, Self::All(mut right)) => {
                right.insert(0, this);
                Self::All(right)
            }
            (this, other) => Self::All(vec![this, other]),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// The primary key this filter pins, if it is (or contains at its top
    /// level) an `id` equality.
    #[must_use]
    pub fn id_value(&self) -> Option<&Value> {
        match self {
            Self::Field(f) if f.field() == system_fields::ID => match f.op() {
                FilterOp::Equals(v) => Some(v),
                _ => None,
            },
            Self::All(filters) => filters.iter().find_map(Self::id_value),
            _ => None,
        }
    }

    /// Every field name referenced anywhere in the tree.
    #[must_use]
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Field(f) => {
                if !out.contains(&f.field()) {
                    out.push(f.field());
                }
            }
            Self::All(filters) | Self::Any(filters) => {
                for f in filters {
                    f.collect_fields(out);
                }
            }
            Self::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Render back to the where-clause object shape accepted by
    /// [`Filter::from_json`](crate::compiler).
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        match self {
            Self::Field(f) => {
                let mut ops = Map::new();
                ops.insert(f.op().key().to_owned(), f.op().operand_json());
                obj.insert(f.field().to_owned(), Value::Object(ops));
            }
            Self::All(filters) => {
                obj.insert(
                    "AND".to_owned(),
                    Value::Array(filters.iter().map(Self::to_json).collect()),
                );
            }
            Self::Any(filters) => {
                obj.insert(
                    "OR".to_owned(),
                    Value::Array(filters.iter().map(Self::to_json).collect()),
                );
            }
            Self::Not(inner) => {
                obj.insert("NOT".to_owned(), inner.to_json());
            }
        }
        Value::Object(obj)
    }
}
