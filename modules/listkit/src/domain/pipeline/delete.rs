use listkit_db::Item;
use listkit_security::{Filter, system_fields};
use serde_json::Value;
use tracing::info;

use super::{client, locate, persistence_error};
use crate::context::Context;
use crate::domain::Operation;
use crate::domain::hooks::{OperationHooks, Phase, fields_on_item};
use crate::error::ListkitError;
use crate::schema::ListDescriptor;

/// Delete the item matching `where_`. `None` if delete access is denied or
/// nothing matches within the caller's scope.
///
/// No input hooks run. Field `beforeOperation` stages see an empty payload.
///
/// # Errors
///
/// Access-rule, hook and persistence failures.
pub async fn execute(
    ctx: &Context,
    list: &ListDescriptor,
    where_: Filter,
) -> Result<Option<Item>, ListkitError> {
    let Some(existing) = locate(ctx, list, Operation::Delete, where_, None).await? else {
        return Ok(None);
    };

    let empty = Item::new();
    let before = OperationHooks {
        context: ctx,
        list,
        operation: Operation::Delete,
        resolved_data: &empty,
        item: Some(&existing),
        original_item: None,
    };
    before.run_fields(Phase::Before, list.fields()).await?;
    before.run_list(Phase::Before).await?;

    let id = existing.get(system_fields::ID).cloned().unwrap_or(Value::Null);
    let deleted = client(ctx, list)?
        .delete(&Filter::id(id))
        .await
        .map_err(persistence_error(list))?;

    let after = OperationHooks {
        item: Some(&deleted),
        original_item: Some(&existing),
        ..before
    };
    after.run_list(Phase::After).await?;
    after.run_fields(Phase::After, fields_on_item(list, &existing)).await?;

    info!(list = list.key(), id = ?deleted.get(system_fields::ID), "item deleted");
    Ok(Some(deleted))
}
