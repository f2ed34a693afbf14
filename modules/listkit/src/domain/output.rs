//! Output filtering.
//!
//! Per key of an outgoing item:
//!
//! - system fields are kept;
//! - a foreign-key column is kept only if its relationship is readable;
//! - keys that are not fields are dropped;
//! - fields the caller may not read are dropped (skipped under sudo);
//! - relation objects are filtered with the target list's descriptors and
//!   the target list's query access;
//! - `resolveOutput` stages replace the value, `None` drops the key.
//!
//! Virtual fields are then computed from their `resolveOutput` stages.
//! Filtering an already-filtered item changes nothing, provided the
//! `resolveOutput` stages are themselves idempotent.

use std::collections::HashSet;

use futures::future::{BoxFuture, try_join_all};
use listkit_db::{FindManyArgs, Item};
use listkit_security::{Filter, system_fields};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::Context;
use crate::domain::access::{check_list_access, field_allowed};
use crate::domain::hooks::{FieldHook, FieldOutputArgs};
use crate::domain::pipeline::{client, persistence_error};
use crate::domain::{FieldOperation, Operation};
use crate::error::ListkitError;
use crate::schema::{FieldDescriptor, ListDescriptor};

/// Filter many items of one list concurrently.
///
/// # Errors
///
/// Access-rule, hook and persistence failures.
pub async fn filter_items(
    ctx: &Context,
    list: &ListDescriptor,
    items: Vec<Item>,
) -> Result<Vec<Item>, ListkitError> {
    try_join_all(items.into_iter().map(|item| filter_item(ctx, list, item, 0))).await
}

/// Filter one item; `depth` counts relation hops from the top-level item.
///
/// # Errors
///
/// Access-rule, hook and persistence failures.
pub fn filter_item<'a>(
    ctx: &'a Context,
    list: &'a ListDescriptor,
    item: Item,
    depth: usize,
) -> BoxFuture<'a, Result<Item, ListkitError>> {
    Box::pin(async move {
        let mut out = Item::new();
        for (key, value) in &item {
            if system_fields::is_system(key) {
                out.insert(key.clone(), value.clone());
                continue;
            }
            let Some(field) = list.field(key) else {
                if let Some(relation) = list.field_for_column(key)
                    && readable(ctx, list, relation, &item).await?
                {
                    out.insert(key.clone(), value.clone());
                }
                continue;
            };
            if field.is_virtual() || !readable(ctx, list, field, &item).await? {
                continue;
            }

            let value = if field.is_relationship() {
                if depth >= ctx.config().output.max_depth {
                    warn!(
                        list = list.key(),
                        field = field.name(),
                        depth,
                        "output depth limit reached, relation dropped"
                    );
                    continue;
                }
                relation_value(ctx, list, field, value.clone(), depth).await?
            } else {
                value.clone()
            };

            if let Some(value) = resolve_output(ctx, list, field, Some(value), &item).await? {
                out.insert(key.clone(), value);
            }
        }

        for field in list.fields().filter(|f| f.is_virtual()) {
            if !readable(ctx, list, field, &item).await? {
                continue;
            }
            if let Some(value) = resolve_output(ctx, list, field, None, &item).await? {
                out.insert(field.name().to_owned(), value);
            }
        }
        Ok(out)
    })
}

async fn readable(
    ctx: &Context,
    list: &ListDescriptor,
    field: &FieldDescriptor,
    item: &Item,
) -> Result<bool, ListkitError> {
    let allowed = field_allowed(ctx, list, field, FieldOperation::Read, Some(item), None).await?;
    if !allowed {
        debug!(list = list.key(), field = field.name(), "field read denied");
    }
    Ok(allowed)
}

/// Run `resolveOutput` stages in order; `None` from any stage drops the key.
async fn resolve_output(
    ctx: &Context,
    list: &ListDescriptor,
    field: &FieldDescriptor,
    mut value: Option<Value>,
    item: &Item,
) -> Result<Option<Value>, ListkitError> {
    for hook in field.hooks() {
        let FieldHook::ResolveOutput(f) = hook else {
            continue;
        };
        value = f(FieldOutputArgs {
            context: ctx.clone(),
            list_key: list.key().to_owned(),
            field_key: field.name().to_owned(),
            value,
            item: item.clone(),
        })
        .await
        .map_err(ListkitError::hook(list.key(), Some(field.name()), "resolveOutput"))?;
        if value.is_none() && !field.is_virtual() {
            break;
        }
    }
    Ok(value)
}

/// Filter an included relation object (or array of them).
async fn relation_value(
    ctx: &Context,
    list: &ListDescriptor,
    field: &FieldDescriptor,
    value: Value,
    depth: usize,
) -> Result<Value, ListkitError> {
    let target = list
        .relation(field.name())
        .and_then(|r| ctx.schema().list(&r.target_list))
        .ok_or_else(|| ListkitError::UnknownField {
            list: list.key().to_owned(),
            field: field.name().to_owned(),
        })?;
    match value {
        Value::Object(related) => {
            let mut visible = visible(ctx, target, vec![related]).await?;
            match visible.pop() {
                Some(related) => Ok(Value::Object(filter_item(ctx, target, related, depth + 1).await?)),
                None => Ok(Value::Null),
            }
        }
        Value::Array(items) => {
            let related: Vec<Item> = items
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            let visible = visible(ctx, target, related).await?;
            let filtered = try_join_all(
                visible
                    .into_iter()
                    .map(|related| filter_item(ctx, target, related, depth + 1)),
            )
            .await?;
            Ok(Value::Array(filtered.into_iter().map(Value::Object).collect()))
        }
        other => Ok(other),
    }
}

/// Keep the related items the caller may query.
async fn visible(
    ctx: &Context,
    target: &ListDescriptor,
    mut items: Vec<Item>,
) -> Result<Vec<Item>, ListkitError> {
    if items.is_empty() {
        return Ok(items);
    }
    let scope = check_list_access(ctx, target, Operation::Query, None, None).await?;
    if scope.is_unconstrained() {
        return Ok(items);
    }
    if scope.is_deny_all() {
        debug!(list = target.key(), "related items hidden by query access");
        return Ok(Vec::new());
    }

    let ids: Vec<Value> = items
        .iter()
        .filter_map(|i| i.get(system_fields::ID).cloned())
        .collect();
    let args = FindManyArgs {
        where_: scope.and_where(Some(Filter::r#in(system_fields::ID, ids))),
        ..FindManyArgs::default()
    };
    let allowed: HashSet<String> = client(ctx, target)?
        .find_many(&args)
        .await
        .map_err(persistence_error(target))?
        .iter()
        .filter_map(|i| i.get(system_fields::ID).map(Value::to_string))
        .collect();
    items.retain(|i| {
        i.get(system_fields::ID)
            .is_some_and(|id| allowed.contains(&id.to_string()))
    });
    Ok(items)
}
