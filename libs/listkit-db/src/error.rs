use serde_json::Value;

/// Provider code for a unique-constraint violation.
pub const UNIQUE_CONSTRAINT_CODE: &str = "P2002";
/// Provider code for "record to update/delete does not exist".
pub const RECORD_NOT_FOUND_CODE: &str = "P2025";

/// Errors surfaced by a persistence engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceError {
    #[error("unique constraint failed on: {}", .fields.join(", "))]
    UniqueConstraint { fields: Vec<String> },

    #[error("record not found in list '{list}'")]
    RecordNotFound { list: String },

    #[error("unknown list '{list}'")]
    UnknownList { list: String },

    #[error("provider error {code}: {message}")]
    Provider { code: String, message: String },
}

impl PersistenceError {
    /// Classify a provider-specific failure.
    ///
    /// `target` is the provider's list of offending columns; it may be a
    /// JSON array of names or a single constraint-name string such as
    /// `"User_email_key"`.
    #[must_use]
    pub fn from_provider(code: &str, message: &str, list: &str, target: Option<&Value>) -> Self {
        match code {
            UNIQUE_CONSTRAINT_CODE => Self::UniqueConstraint {
                fields: target.map(parse_target).unwrap_or_default(),
            },
            RECORD_NOT_FOUND_CODE => Self::RecordNotFound {
                list: list.to_owned(),
            },
            _ => Self::Provider {
                code: code.to_owned(),
                message: message.to_owned(),
            },
        }
    }

    /// A message safe to show to end users.
    #[must_use]
    pub fn friendly_message(&self) -> String {
        match self {
            Self::UniqueConstraint { fields } if !fields.is_empty() => {
                format!("A record with this {} already exists", fields.join(", "))
            }
            Self::UniqueConstraint { .. } => "A record with this value already exists".to_owned(),
            Self::RecordNotFound { .. } | Self::UnknownList { .. } | Self::Provider { .. } => {
                "Database operation failed".to_owned()
            }
        }
    }
}

fn parse_target(target: &Value) -> Vec<String> {
    match target {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(ToOwned::to_owned)
            .collect(),
        Value::String(constraint) => constraint_columns(constraint),
        _ => Vec::new(),
    }
}

/// `"User_email_key"` -> `["email"]`, `"Post_slug_tenant_key"` -> `["slug", "tenant"]`.
fn constraint_columns(constraint: &str) -> Vec<String> {
    let trimmed = constraint.strip_suffix("_key").unwrap_or(constraint);
    match trimmed.split_once('_') {
        Some((_, cols)) => cols.split('_').map(ToOwned::to_owned).collect(),
        None => vec![trimmed.to_owned()],
    }
}
