use futures::future::try_join_all;
use listkit_db::{CountArgs, FindManyArgs, Include, Item};
use listkit_security::Filter;
use tracing::debug;

use super::{client, persistence_error};
use crate::context::Context;
use crate::domain::Operation;
use crate::domain::access::check_list_access;
use crate::domain::hooks::{OperationHooks, Phase, fields_on_item};
use crate::error::ListkitError;
use crate::schema::ListDescriptor;

/// # Errors
///
/// Access-rule, hook and persistence failures.
pub async fn find_unique(
    ctx: &Context,
    list: &ListDescriptor,
    where_: Filter,
    include: Option<&Include>,
) -> Result<Option<Item>, ListkitError> {
    let scope = check_list_access(ctx, list, Operation::Query, None, None).await?;
    if scope.is_deny_all() {
        debug!(list = list.key(), "query denied");
        return Ok(None);
    }
    let client = client(ctx, list)?;
    let found = if scope.is_unconstrained() {
        client.find_unique(&where_, include).await
    } else {
        let filter = scope.and_where(Some(where_));
        client.find_first(filter.as_ref(), include).await
    }
    .map_err(persistence_error(list))?;

    match found {
        Some(item) => {
            observe(ctx, list, &item).await?;
            Ok(Some(item))
        }
        None => Ok(None),
    }
}

/// # Errors
///
/// Access-rule, hook and persistence failures.
pub async fn find_many(
    ctx: &Context,
    list: &ListDescriptor,
    mut args: FindManyArgs,
) -> Result<Vec<Item>, ListkitError> {
    let scope = check_list_access(ctx, list, Operation::Query, None, None).await?;
    if scope.is_deny_all() {
        debug!(list = list.key(), "query denied");
        return Ok(Vec::new());
    }
    args.where_ = scope.and_where(args.where_.take());
    args.take = ctx.config().query.effective_take(args.take);

    let items = client(ctx, list)?
        .find_many(&args)
        .await
        .map_err(persistence_error(list))?;
    try_join_all(items.iter().map(|item| observe(ctx, list, item))).await?;
    debug!(list = list.key(), count = items.len(), "query returned");
    Ok(items)
}

/// # Errors
///
/// Access-rule and persistence failures.
pub async fn count(
    ctx: &Context,
    list: &ListDescriptor,
    args: CountArgs,
) -> Result<u64, ListkitError> {
    let scope = check_list_access(ctx, list, Operation::Query, None, None).await?;
    if scope.is_deny_all() {
        debug!(list = list.key(), "count denied");
        return Ok(0);
    }
    let filter = scope.and_where(args.where_);
    client(ctx, list)?
        .count(filter.as_ref())
        .await
        .map_err(persistence_error(list))
}

/// Field `afterOperation` stages for a read item.
async fn observe(ctx: &Context, list: &ListDescriptor, item: &Item) -> Result<(), ListkitError> {
    let empty = Item::new();
    OperationHooks {
        context: ctx,
        list,
        operation: Operation::Query,
        resolved_data: &empty,
        item: Some(item),
        original_item: None,
    }
    .run_fields(Phase::After, fields_on_item(list, item))
    .await
}
