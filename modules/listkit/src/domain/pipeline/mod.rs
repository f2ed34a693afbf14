//! Operation pipeline: the entry point of every list operation.
//!
//! Write order (create/update):
//!
//! 1. operation access (update/delete: after locating the target item)
//! 2. list `resolveInput`
//! 3. field `resolveInput`
//! 4. list `validateInput` + structural validation (one aggregated error)
//! 5. field write access (denied fields dropped)
//! 6. nested relationship writes
//! 7. field `beforeOperation`
//! 8. list `beforeOperation`
//! 9. persistence
//! 10. list `afterOperation`
//! 11. field `afterOperation`
//! 12. output filtering
//!
//! A denied operation returns `None`/`vec![]`/`0` before any hook runs.
//! Persistence is not touched either, except to read the target item an
//! update or delete predicate rule is evaluated against.

pub mod create;
pub mod delete;
pub mod query;
pub mod update;

use std::sync::Arc;

use listkit_db::{CountArgs, FindManyArgs, Include, Item, ListClient, PersistenceError};
use listkit_security::{Filter, system_fields};
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::context::Context;
use crate::domain::access::check_list_access;
use crate::domain::{Operation, output};
use crate::error::ListkitError;
use crate::schema::ListDescriptor;

/// Operations on one list, bound to a context.
#[derive(Clone, Debug)]
pub struct ListOperations {
    ctx: Context,
    list: Arc<ListDescriptor>,
}

impl ListOperations {
    pub(crate) fn new(ctx: Context, list: Arc<ListDescriptor>) -> Self {
        Self { ctx, list }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        self.list.key()
    }

    /// # Errors
    ///
    /// See [`ListOperations::find_unique_with`].
    pub async fn find_unique(&self, where_: Filter) -> Result<Option<Item>, ListkitError> {
        self.find_unique_with(where_, None).await
    }

    /// The single item matching `where_`, with `include`d relations.
    /// `None` if it does not exist or the caller may not read it.
    ///
    /// # Errors
    ///
    /// Access-rule, hook and persistence failures.
    #[instrument(skip_all, fields(list = %self.list.key(), sudo = self.ctx.is_sudo()))]
    pub async fn find_unique_with(
        &self,
        where_: Filter,
        include: Option<Include>,
    ) -> Result<Option<Item>, ListkitError> {
        match query::find_unique(&self.ctx, &self.list, where_, include.as_ref()).await? {
            Some(item) => Ok(Some(output::filter_item(&self.ctx, &self.list, item, 0).await?)),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Access-rule, hook and persistence failures.
    #[instrument(skip_all, fields(list = %self.list.key(), sudo = self.ctx.is_sudo()))]
    pub async fn find_many(&self, args: FindManyArgs) -> Result<Vec<Item>, ListkitError> {
        let items = query::find_many(&self.ctx, &self.list, args).await?;
        output::filter_items(&self.ctx, &self.list, items).await
    }

    /// # Errors
    ///
    /// Access-rule and persistence failures.
    #[instrument(skip_all, fields(list = %self.list.key(), sudo = self.ctx.is_sudo()))]
    pub async fn count(&self, args: CountArgs) -> Result<u64, ListkitError> {
        query::count(&self.ctx, &self.list, args).await
    }

    /// # Errors
    ///
    /// [`ListkitError::Validation`] with every violation, plus access-rule,
    /// hook, nested-write and persistence failures.
    #[instrument(skip_all, fields(list = %self.list.key(), sudo = self.ctx.is_sudo()))]
    pub async fn create(&self, data: Item) -> Result<Option<Item>, ListkitError> {
        match create::execute(&self.ctx, &self.list, data).await? {
            Some(item) => Ok(Some(output::filter_item(&self.ctx, &self.list, item, 0).await?)),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// As [`ListOperations::create`].
    #[instrument(skip_all, fields(list = %self.list.key(), sudo = self.ctx.is_sudo()))]
    pub async fn update(&self, where_: Filter, data: Item) -> Result<Option<Item>, ListkitError> {
        match update::execute(&self.ctx, &self.list, where_, data).await? {
            Some(item) => Ok(Some(output::filter_item(&self.ctx, &self.list, item, 0).await?)),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Access-rule, hook and persistence failures.
    #[instrument(skip_all, fields(list = %self.list.key(), sudo = self.ctx.is_sudo()))]
    pub async fn delete(&self, where_: Filter) -> Result<Option<Item>, ListkitError> {
        match delete::execute(&self.ctx, &self.list, where_).await? {
            Some(item) => Ok(Some(output::filter_item(&self.ctx, &self.list, item, 0).await?)),
            None => Ok(None),
        }
    }
}

/// The persistence client of `list`.
///
/// # Errors
///
/// [`ListkitError::Persistence`] if the database does not know the list.
pub fn client(ctx: &Context, list: &ListDescriptor) -> Result<Arc<dyn ListClient>, ListkitError> {
    ctx.database()
        .list(list.key())
        .map_err(persistence_error(list))
}

/// Log and wrap a persistence failure on `list`.
pub fn persistence_error(list: &ListDescriptor) -> impl FnOnce(PersistenceError) -> ListkitError {
    let key = list.key().to_owned();
    move |err| {
        error!(list = %key, error = %err, "persistence call failed");
        ListkitError::Persistence(err)
    }
}

/// Find the item an update or delete targets and check the caller may touch
/// it. `None` if nothing matches `where_` or access is denied.
///
/// Predicate rules are evaluated against the item `where_` matches. When such
/// a rule answers with a filter, the item is looked up again under that
/// filter. Constant rules decide before anything is read.
///
/// # Errors
///
/// Access-rule and persistence failures.
pub async fn locate(
    ctx: &Context,
    list: &ListDescriptor,
    operation: Operation,
    where_: Filter,
    input_data: Option<&Item>,
) -> Result<Option<Item>, ListkitError> {
    let client = client(ctx, list)?;
    let candidate = if !ctx.is_sudo() && list.access().rule(operation).is_predicate() {
        let found = client
            .find_first(Some(&where_), None)
            .await
            .map_err(persistence_error(list))?;
        if found.is_none() {
            debug!(list = list.key(), %operation, "target not found");
            return Ok(None);
        }
        found
    } else {
        None
    };

    let scope = check_list_access(ctx, list, operation, candidate.as_ref(), input_data).await?;
    if scope.is_deny_all() {
        debug!(list = list.key(), %operation, "operation denied");
        return Ok(None);
    }
    let where_ = match candidate {
        Some(item) if scope.filter().is_none() => return Ok(Some(item)),
        Some(item) => Filter::id(item.get(system_fields::ID).cloned().unwrap_or(Value::Null)),
        None => where_,
    };
    let found = client
        .find_first(scope.and_where(Some(where_)).as_ref(), None)
        .await
        .map_err(persistence_error(list))?;
    if found.is_none() {
        debug!(list = list.key(), %operation, "target not found in scope");
    }
    Ok(found)
}
