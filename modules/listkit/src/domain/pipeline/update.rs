use futures::future::BoxFuture;
use listkit_db::Item;
use listkit_security::{Filter, system_fields};
use serde_json::Value;
use tracing::info;

use super::{client, locate, persistence_error};
use crate::context::Context;
use crate::domain::Operation;
use crate::domain::access::{check_known_fields, filter_writable};
use crate::domain::hooks::{OperationHooks, Phase, WriteEnvelope, fields_in_data, fields_on_item};
use crate::domain::{nested, validation};
use crate::error::{ListkitError, ValidationError};
use crate::schema::ListDescriptor;

/// Top-level update. `None` if update access is denied or no item matches
/// `where_` within the caller's scope.
///
/// # Errors
///
/// See [`run`].
pub async fn execute(
    ctx: &Context,
    list: &ListDescriptor,
    where_: Filter,
    data: Item,
) -> Result<Option<Item>, ListkitError> {
    let Some(existing) = locate(ctx, list, Operation::Update, where_, Some(&data)).await? else {
        return Ok(None);
    };
    run(ctx, list, existing, data, 0).await.map(Some)
}

/// Everything after the item has been located.
///
/// # Errors
///
/// Validation, hook, nested-write and persistence failures.
pub fn run<'a>(
    ctx: &'a Context,
    list: &'a ListDescriptor,
    existing: Item,
    input: Item,
    depth: usize,
) -> BoxFuture<'a, Result<Item, ListkitError>> {
    Box::pin(async move {
        check_known_fields(list, &input)?;
        let envelope = WriteEnvelope {
            context: ctx,
            list,
            operation: Operation::Update,
            input_data: &input,
            item: Some(&existing),
        };
        let resolved = envelope.list_resolve_input(input.clone()).await?;
        let resolved = envelope.field_resolve_input(resolved).await?;

        let mut errors = ValidationError::default();
        for message in envelope.validate_input(&resolved).await? {
            errors.push(message);
        }
        errors.extend(validation::validate(list, Operation::Update, &resolved, &input));
        errors.into_result()?;

        let data = filter_writable(
            ctx,
            list,
            Operation::Update,
            resolved,
            Some(&existing),
            &input,
        )
        .await?;
        let write = nested::resolve(ctx, list, data.clone(), Some(&existing), depth).await?;

        let before = OperationHooks {
            context: ctx,
            list,
            operation: Operation::Update,
            resolved_data: &data,
            item: Some(&existing),
            original_item: None,
        };
        before.run_fields(Phase::Before, fields_in_data(list, &data)).await?;
        before.run_list(Phase::Before).await?;

        let id = existing.get(system_fields::ID).cloned().unwrap_or(Value::Null);
        let updated = client(ctx, list)?
            .update(&Filter::id(id), write)
            .await
            .map_err(persistence_error(list))?;

        let after = OperationHooks {
            item: Some(&updated),
            original_item: Some(&existing),
            ..before
        };
        after.run_list(Phase::After).await?;
        after.run_fields(Phase::After, fields_on_item(list, &updated)).await?;

        info!(
            list = list.key(),
            id = ?updated.get(system_fields::ID),
            depth,
            "item updated"
        );
        Ok(updated)
    })
}
