//! Access evaluator.
//!
//! Every rule resolves to an [`AccessScope`]:
//!
//! | Rule result | Scope |
//! |-------------|-------|
//! | `Allow` / `Allowed(true)` | unconstrained |
//! | `Deny` / `Allowed(false)` | deny-all |
//! | `Filter(f)` | filtered by `f` |
//!
//! A predicate that returns an error aborts the operation; it is never
//! read as a denial.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use listkit_db::Item;
use listkit_security::{AccessScope, Filter, Session, system_fields};
use tracing::{debug, warn};

use crate::context::Context;
use crate::domain::{FieldOperation, Operation};
use crate::error::ListkitError;
use crate::schema::{FieldDescriptor, ListDescriptor};

/// What an access predicate decided.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessOutcome {
    Allowed(bool),
    Filter(Filter),
}

impl From<bool> for AccessOutcome {
    fn from(allowed: bool) -> Self {
        Self::Allowed(allowed)
    }
}

impl From<Filter> for AccessOutcome {
    fn from(filter: Filter) -> Self {
        Self::Filter(filter)
    }
}

/// Arguments handed to an access predicate.
#[derive(Clone)]
pub struct AccessArgs {
    pub context: Context,
    pub list_key: String,
    /// Set for field-level rules.
    pub field_key: Option<String>,
    pub operation: Operation,
    /// The item being read or written. List rules see it for update and
    /// delete; query and create rules always see `None`.
    pub item: Option<Item>,
    /// The raw payload, for create/update.
    pub input_data: Option<Item>,
}

impl AccessArgs {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.context.session()
    }
}

pub type AccessFn =
    dyn Fn(AccessArgs) -> BoxFuture<'static, anyhow::Result<AccessOutcome>> + Send + Sync;

/// An access rule: a constant or an async predicate.
#[derive(Clone, Default)]
pub enum AccessRule {
    #[default]
    Allow,
    Deny,
    Predicate(Arc<AccessFn>),
}

impl fmt::Debug for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("Allow"),
            Self::Deny => f.write_str("Deny"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<bool> for AccessRule {
    fn from(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }
}

impl AccessRule {
    /// Async predicate.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(AccessArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<AccessOutcome>> + Send + 'static,
    {
        Self::Predicate(Arc::new(move |args| Box::pin(f(args))))
    }

    /// Synchronous yes/no predicate.
    pub fn when<F>(f: F) -> Self
    where
        F: Fn(&AccessArgs) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(move |args| {
            let allowed = f(&args);
            Box::pin(async move { Ok(AccessOutcome::Allowed(allowed)) })
        }))
    }

    /// Synchronous filter predicate. `None` denies.
    pub fn filter_with<F>(f: F) -> Self
    where
        F: Fn(&AccessArgs) -> Option<Filter> + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(move |args| {
            let outcome = f(&args).map_or(AccessOutcome::Allowed(false), AccessOutcome::Filter);
            Box::pin(async move { Ok(outcome) })
        }))
    }

    /// Whether the rule depends on its arguments.
    #[must_use]
    pub fn is_predicate(&self) -> bool {
        matches!(self, Self::Predicate(_))
    }

    /// Allow any request that carries a session.
    #[must_use]
    pub fn signed_in() -> Self {
        Self::when(|args| args.session().is_some())
    }
}

/// Resolve a rule to a scope.
///
/// # Errors
///
/// Whatever the predicate returned.
pub async fn evaluate(rule: &AccessRule, args: AccessArgs) -> anyhow::Result<AccessScope> {
    match rule {
        AccessRule::Allow => Ok(AccessScope::allow_all()),
        AccessRule::Deny => Ok(AccessScope::deny_all()),
        AccessRule::Predicate(f) => Ok(match f(args).await? {
            AccessOutcome::Allowed(allowed) => AccessScope::from(allowed),
            AccessOutcome::Filter(filter) => AccessScope::filtered(filter),
        }),
    }
}

/// Operation-level check. Sudo contexts are always unconstrained.
///
/// A filter result for `create` is treated as deny: there is no row yet
/// for it to constrain.
///
/// # Errors
///
/// [`ListkitError::AccessRule`] if the predicate fails.
pub async fn check_list_access(
    ctx: &Context,
    list: &ListDescriptor,
    operation: Operation,
    item: Option<&Item>,
    input_data: Option<&Item>,
) -> Result<AccessScope, ListkitError> {
    if ctx.is_sudo() {
        return Ok(AccessScope::allow_all());
    }
    let args = AccessArgs {
        context: ctx.clone(),
        list_key: list.key().to_owned(),
        field_key: None,
        operation,
        item: item.cloned(),
        input_data: input_data.cloned(),
    };
    let scope = evaluate(list.access().rule(operation), args)
        .await
        .map_err(|source| ListkitError::AccessRule {
            list: list.key().to_owned(),
            field: None,
            source,
        })?;

    if operation == Operation::Create && scope.filter().is_some() {
        warn!(list = list.key(), "filter-valued create access treated as deny");
        return Ok(AccessScope::deny_all());
    }
    debug!(
        list = list.key(),
        %operation,
        denied = scope.is_deny_all(),
        filtered = scope.filter().is_some(),
        "list access evaluated"
    );
    Ok(scope)
}

/// Field-level check. Filter results count as allow.
///
/// # Errors
///
/// [`ListkitError::AccessRule`] if the predicate fails.
pub async fn field_allowed(
    ctx: &Context,
    list: &ListDescriptor,
    field: &FieldDescriptor,
    operation: FieldOperation,
    item: Option<&Item>,
    input_data: Option<&Item>,
) -> Result<bool, ListkitError> {
    if ctx.is_sudo() {
        return Ok(true);
    }
    let rule = field.access().rule(operation);
    match rule {
        AccessRule::Allow => return Ok(true),
        AccessRule::Deny => return Ok(false),
        AccessRule::Predicate(_) => {}
    }
    let args = AccessArgs {
        context: ctx.clone(),
        list_key: list.key().to_owned(),
        field_key: Some(field.name().to_owned()),
        operation: match operation {
            FieldOperation::Read => Operation::Query,
            FieldOperation::Create => Operation::Create,
            FieldOperation::Update => Operation::Update,
        },
        item: item.cloned(),
        input_data: input_data.cloned(),
    };
    let scope = evaluate(rule, args)
        .await
        .map_err(|source| ListkitError::AccessRule {
            list: list.key().to_owned(),
            field: Some(field.name().to_owned()),
            source,
        })?;
    Ok(!scope.is_deny_all())
}

/// Drop fields the caller may not write, plus system and virtual fields.
///
/// # Errors
///
/// [`ListkitError::AccessRule`] if a field predicate fails.
pub async fn filter_writable(
    ctx: &Context,
    list: &ListDescriptor,
    operation: Operation,
    data: Item,
    item: Option<&Item>,
    input_data: &Item,
) -> Result<Item, ListkitError> {
    let field_op = if operation == Operation::Create {
        FieldOperation::Create
    } else {
        FieldOperation::Update
    };
    let mut out = Item::new();
    for (key, value) in data {
        if system_fields::is_system(&key) {
            continue;
        }
        let Some(field) = list.field(&key) else {
            continue;
        };
        if field.is_virtual() {
            continue;
        }
        if field_allowed(ctx, list, field, field_op, item, Some(input_data)).await? {
            out.insert(key, value);
        } else {
            debug!(list = list.key(), field = %key, "write to field denied, dropped");
        }
    }
    Ok(out)
}

/// Reject payload keys that are not fields of `list`. System fields are
/// tolerated here and stripped later.
///
/// # Errors
///
/// [`ListkitError::UnknownField`] for the first unknown key.
pub fn check_known_fields(list: &ListDescriptor, data: &Item) -> Result<(), ListkitError> {
    match data
        .keys()
        .find(|k| !system_fields::is_system(k) && list.field(k).is_none())
    {
        Some(key) => Err(ListkitError::UnknownField {
            list: list.key().to_owned(),
            field: key.clone(),
        }),
        None => Ok(()),
    }
}
