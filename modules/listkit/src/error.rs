use std::collections::BTreeMap;

use listkit_db::PersistenceError;
use listkit_security::FilterParseError;

use crate::domain::NestedOperation;

/// One or more validation failures, collected before the operation aborts.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{}", .errors.join("; "))]
pub struct ValidationError {
    /// Every message, in the order it was found.
    pub errors: Vec<String>,
    /// First message per offending field.
    pub field_errors: BTreeMap<String, String>,
}

impl ValidationError {
    /// A message not tied to a field (e.g. from a list `validateInput` hook).
    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn push_field(&mut self, field: &str, message: impl Into<String>) {
        let message = message.into();
        self.field_errors
            .entry(field.to_owned())
            .or_insert_with(|| message.clone());
        self.errors.push(message);
    }

    pub fn extend(&mut self, other: ValidationError) {
        self.errors.extend(other.errors);
        for (field, message) in other.field_errors {
            self.field_errors.entry(field).or_insert(message);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Err(self)` if anything was collected.
    ///
    /// # Errors
    ///
    /// Returns `self` when it holds at least one message.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Schema build failures. Raised by `SchemaBuilder::build`, never at request time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate list '{list}'")]
    DuplicateList { list: String },

    #[error("duplicate field '{list}.{field}'")]
    DuplicateField { list: String, field: String },

    #[error("'{list}.{field}' uses a name reserved for system fields")]
    ReservedField { list: String, field: String },

    #[error("'{list}.{field}': malformed relationship ref '{reference}'")]
    MalformedRef {
        list: String,
        field: String,
        reference: String,
    },

    #[error("'{list}.{field}' refers to unknown list '{target}'")]
    UnknownRefList {
        list: String,
        field: String,
        target: String,
    },

    #[error("'{list}.{field}' refers to unknown field '{target}.{target_field}'")]
    UnknownRefField {
        list: String,
        field: String,
        target: String,
        target_field: String,
    },

    #[error("'{list}.{field}' refers to '{target}.{target_field}', which is not a relationship")]
    RefNotRelationship {
        list: String,
        field: String,
        target: String,
        target_field: String,
    },

    #[error("'{list}.{field}' and '{target}.{target_field}' do not point at each other")]
    RefMismatch {
        list: String,
        field: String,
        target: String,
        target_field: String,
    },

    #[error("both '{first}' and '{second}' declare foreign_key")]
    ConflictingForeignKey { first: String, second: String },

    #[error("join table '{table}' is produced by both '{first}' and '{second}'")]
    AmbiguousJoinTable {
        table: String,
        first: String,
        second: String,
    },

    #[error("virtual field '{list}.{field}' cannot be {modifier}")]
    VirtualWithStorage {
        list: String,
        field: String,
        modifier: &'static str,
    },

    #[error("'{list}.{field}': {reason}")]
    InvalidField {
        list: String,
        field: String,
        reason: String,
    },

    #[error("plugin '{plugin}' targets unknown list '{list}'")]
    UnknownPluginTarget { plugin: String, list: String },

    #[error("stack is missing its {0}")]
    MissingComponent(&'static str),

    #[error("failed to load configuration: {0}")]
    Load(#[source] Box<figment::Error>),
}

/// The error returned by every list operation.
///
/// Access denial is not represented here: denied top-level operations
/// return `None`, an empty list or `0`.
#[derive(Debug, thiserror::Error)]
pub enum ListkitError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("access denied: cannot {operation} '{list}' through relation '{field}'")]
    RelationAccess {
        list: String,
        field: String,
        operation: NestedOperation,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("{hook} hook failed on '{}'", hook_target(.list, .field.as_deref()))]
    Hook {
        list: String,
        field: Option<String>,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("access rule failed on '{}'", hook_target(.list, .field.as_deref()))]
    AccessRule {
        list: String,
        field: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown list '{0}'")]
    UnknownList(String),

    #[error("unknown field '{field}' on list '{list}'")]
    UnknownField { list: String, field: String },

    #[error("invalid nested write on '{list}.{field}': {reason}")]
    InvalidNestedWrite {
        list: String,
        field: String,
        reason: String,
    },

    #[error("invalid where clause: {0}")]
    InvalidWhere(#[from] FilterParseError),

    #[error("nested writes exceed the maximum depth of {max_depth}")]
    NestingTooDeep { max_depth: usize },
}

fn hook_target(list: &str, field: Option<&str>) -> String {
    match field {
        Some(field) => format!("{list}.{field}"),
        None => list.to_owned(),
    }
}

impl ListkitError {
    pub(crate) fn hook(
        list: &str,
        field: Option<&str>,
        hook: &'static str,
    ) -> impl FnOnce(anyhow::Error) -> Self {
        let list = list.to_owned();
        let field = field.map(ToOwned::to_owned);
        move |source| Self::Hook {
            list,
            field,
            hook,
            source,
        }
    }

    pub(crate) fn relation_access(list: &str, field: &str, operation: NestedOperation) -> Self {
        Self::RelationAccess {
            list: list.to_owned(),
            field: field.to_owned(),
            operation,
        }
    }

    pub(crate) fn invalid_nested(list: &str, field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidNestedWrite {
            list: list.to_owned(),
            field: field.to_owned(),
            reason: reason.into(),
        }
    }

    /// The validation error, if this is one.
    #[must_use]
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(v) => Some(v),
            _ => None,
        }
    }
}
