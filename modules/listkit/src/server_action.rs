//! Generic create/update/delete dispatcher for form-style callers.

use std::collections::BTreeMap;

use listkit_db::error::{RECORD_NOT_FOUND_CODE, UNIQUE_CONSTRAINT_CODE};
use listkit_db::{Item, PersistenceError};
use listkit_security::Filter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, instrument};

use crate::context::Context;
use crate::error::{ListkitError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

/// A dispatch request. `update`/`delete` address the item by `id` or by a
/// where-clause object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAction {
    pub list_key: String,
    pub action: ActionKind,
    #[serde(default)]
    pub data: Option<Item>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, rename = "where")]
    pub where_: Option<Value>,
}

pub const VALIDATION_CODE: &str = "VALIDATION_ERROR";
pub const ACCESS_DENIED_CODE: &str = "ACCESS_DENIED";
pub const BAD_REQUEST_CODE: &str = "BAD_REQUEST";
pub const INTERNAL_CODE: &str = "INTERNAL_ERROR";

/// The error shape returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{error}")]
pub struct ActionError {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: BTreeMap<String, String>,
    /// The original validation error, unchanged.
    #[serde(skip)]
    pub validation: Option<ValidationError>,
}

impl ActionError {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            field_errors: BTreeMap::new(),
            validation: None,
        }
    }
}

impl From<ListkitError> for ActionError {
    fn from(err: ListkitError) -> Self {
        match err {
            ListkitError::Validation(validation) => Self {
                error: validation.to_string(),
                code: VALIDATION_CODE.to_owned(),
                field_errors: validation.field_errors.clone(),
                validation: Some(validation),
            },
            ListkitError::Persistence(err) => {
                let code = match &err {
                    PersistenceError::UniqueConstraint { .. } => UNIQUE_CONSTRAINT_CODE.to_owned(),
                    PersistenceError::RecordNotFound { .. } => RECORD_NOT_FOUND_CODE.to_owned(),
                    PersistenceError::Provider { code, .. } => code.clone(),
                    PersistenceError::UnknownList { .. } => INTERNAL_CODE.to_owned(),
                };
                Self::new(err.friendly_message(), code)
            }
            err @ ListkitError::RelationAccess { .. } => Self::new(err.to_string(), ACCESS_DENIED_CODE),
            err @ (ListkitError::UnknownList(_)
            | ListkitError::UnknownField { .. }
            | ListkitError::InvalidNestedWrite { .. }
            | ListkitError::InvalidWhere(_)
            | ListkitError::NestingTooDeep { .. }) => Self::new(err.to_string(), BAD_REQUEST_CODE),
            err => {
                error!(error = ?err, "server action failed");
                Self::new("An unexpected error occurred", INTERNAL_CODE)
            }
        }
    }
}

/// Dispatch `action` to the list's `create`, `update` or `delete`.
///
/// `Ok(None)` means access was denied or the item was not found.
///
/// # Errors
///
/// [`ActionError`]: validation errors keep their messages and field map,
/// persistence errors carry a friendly message, anything unexpected a
/// generic one.
#[instrument(skip_all, fields(list = %action.list_key, action = ?action.action))]
pub async fn server_action(ctx: &Context, action: ServerAction) -> Result<Option<Item>, ActionError> {
    let list = ctx.list(&action.list_key)?;
    match action.action {
        ActionKind::Create => {
            let data = action
                .data
                .ok_or_else(|| ActionError::new("create requires data", BAD_REQUEST_CODE))?;
            Ok(list.create(data).await?)
        }
        ActionKind::Update => {
            let where_ = target(action.id, action.where_)?;
            let data = action
                .data
                .ok_or_else(|| ActionError::new("update requires data", BAD_REQUEST_CODE))?;
            Ok(list.update(where_, data).await?)
        }
        ActionKind::Delete => {
            let where_ = target(action.id, action.where_)?;
            Ok(list.delete(where_).await?)
        }
    }
}

fn target(id: Option<Value>, where_: Option<Value>) -> Result<Filter, ActionError> {
    match (id, where_) {
        (Some(id), _) => Ok(Filter::id(id)),
        (None, Some(where_)) => Filter::from_json(&where_)
            .map_err(|e| ActionError::from(ListkitError::InvalidWhere(e))),
        (None, None) => Err(ActionError::new("an id or where clause is required", BAD_REQUEST_CODE)),
    }
}
