use futures::future::BoxFuture;
use listkit_db::Item;
use listkit_security::system_fields;
use tracing::{debug, info};

use super::{client, persistence_error};
use crate::context::Context;
use crate::domain::Operation;
use crate::domain::access::{check_known_fields, check_list_access, filter_writable};
use crate::domain::hooks::{OperationHooks, Phase, WriteEnvelope, fields_in_data, fields_on_item};
use crate::domain::{nested, validation};
use crate::error::{ListkitError, ValidationError};
use crate::schema::ListDescriptor;

/// Top-level create. `None` if create access is denied.
///
/// # Errors
///
/// See [`run`].
pub async fn execute(
    ctx: &Context,
    list: &ListDescriptor,
    data: Item,
) -> Result<Option<Item>, ListkitError> {
    let scope = check_list_access(ctx, list, Operation::Create, None, Some(&data)).await?;
    if scope.is_deny_all() {
        debug!(list = list.key(), "create denied");
        return Ok(None);
    }
    run(ctx, list, data, 0).await.map(Some)
}

/// Everything after the access check. Nested creates enter here once the
/// relation's own access check has passed.
///
/// # Errors
///
/// Validation, hook, nested-write and persistence failures.
pub fn run<'a>(
    ctx: &'a Context,
    list: &'a ListDescriptor,
    input: Item,
    depth: usize,
) -> BoxFuture<'a, Result<Item, ListkitError>> {
    Box::pin(async move {
        check_known_fields(list, &input)?;
        let envelope = WriteEnvelope {
            context: ctx,
            list,
            operation: Operation::Create,
            input_data: &input,
            item: None,
        };
        let resolved = envelope.list_resolve_input(input.clone()).await?;
        let resolved = envelope.field_resolve_input(resolved).await?;

        let mut errors = ValidationError::default();
        for message in envelope.validate_input(&resolved).await? {
            errors.push(message);
        }
        errors.extend(validation::validate(list, Operation::Create, &resolved, &input));
        errors.into_result()?;

        let mut data = filter_writable(ctx, list, Operation::Create, resolved, None, &input).await?;
        apply_defaults(list, &mut data);
        let write = nested::resolve(ctx, list, data.clone(), None, depth).await?;

        let before = OperationHooks {
            context: ctx,
            list,
            operation: Operation::Create,
            resolved_data: &data,
            item: None,
            original_item: None,
        };
        before.run_fields(Phase::Before, fields_in_data(list, &data)).await?;
        before.run_list(Phase::Before).await?;

        let created = client(ctx, list)?
            .create(write)
            .await
            .map_err(persistence_error(list))?;

        let after = OperationHooks {
            item: Some(&created),
            ..before
        };
        after.run_list(Phase::After).await?;
        after.run_fields(Phase::After, fields_on_item(list, &created)).await?;

        info!(
            list = list.key(),
            id = ?created.get(system_fields::ID),
            depth,
            "item created"
        );
        Ok(created)
    })
}

/// Fill absent fields that have a default.
fn apply_defaults(list: &ListDescriptor, data: &mut Item) {
    for field in list.fields().filter(|f| f.is_scalar()) {
        if data.contains_key(field.name()) {
            continue;
        }
        if let Some(value) = validation::default_for(field) {
            data.insert(field.name().to_owned(), value);
        }
    }
}
