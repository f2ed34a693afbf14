//! Hook executor.
//!
//! Hooks are ordered lists of typed stages attached to a list or a field.
//! The executor walks the stages of one kind in registration order; a stage
//! that fails aborts the pipeline with [`ListkitError::Hook`].

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use listkit_db::Item;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::domain::Operation;
use crate::error::ListkitError;
use crate::schema::{FieldDescriptor, ListDescriptor};

pub type HookFuture<T> = BoxFuture<'static, anyhow::Result<T>>;

type ListInputFn = dyn Fn(ListInputArgs) -> HookFuture<Item> + Send + Sync;
type ValidateFn = dyn Fn(ValidateInputArgs) -> HookFuture<()> + Send + Sync;
type ListOperationFn = dyn Fn(ListOperationArgs) -> HookFuture<()> + Send + Sync;
type FieldInputFn = dyn Fn(FieldInputArgs) -> HookFuture<Option<Value>> + Send + Sync;
type FieldOperationFn = dyn Fn(FieldOperationArgs) -> HookFuture<()> + Send + Sync;
type FieldOutputFn = dyn Fn(FieldOutputArgs) -> HookFuture<Option<Value>> + Send + Sync;

// ── Arguments ───────────────────────────────────────────────────────

/// Arguments of a list `resolveInput` stage.
#[derive(Clone)]
pub struct ListInputArgs {
    pub context: Context,
    pub list_key: String,
    pub operation: Operation,
    /// The payload as the caller sent it.
    pub input_data: Item,
    /// The payload as transformed by earlier stages.
    pub resolved_data: Item,
    /// The existing item, on update.
    pub item: Option<Item>,
}

/// Collects messages from `validateInput` stages.
#[derive(Clone, Default)]
pub struct ValidationSink {
    errors: Arc<Mutex<Vec<String>>>,
}

impl ValidationSink {
    pub fn add_validation_error(&self, message: impl Into<String>) {
        self.errors.lock().push(message.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.errors.lock())
    }
}

/// Arguments of a list `validateInput` stage.
#[derive(Clone)]
pub struct ValidateInputArgs {
    pub context: Context,
    pub list_key: String,
    pub operation: Operation,
    pub input_data: Item,
    pub resolved_data: Item,
    pub item: Option<Item>,
    pub errors: ValidationSink,
}

impl ValidateInputArgs {
    pub fn add_validation_error(&self, message: impl Into<String>) {
        self.errors.add_validation_error(message);
    }
}

/// Arguments of list `beforeOperation` / `afterOperation` stages.
#[derive(Clone)]
pub struct ListOperationArgs {
    pub context: Context,
    pub list_key: String,
    pub operation: Operation,
    /// The data sent to persistence (empty for delete).
    pub resolved_data: Item,
    /// Before: the existing item (update/delete). After: the persisted item
    /// (create/update) or the deleted item.
    pub item: Option<Item>,
    /// After update/delete: the item as it was before the write.
    pub original_item: Option<Item>,
}

/// Arguments of a field `resolveInput` stage.
#[derive(Clone)]
pub struct FieldInputArgs {
    pub context: Context,
    pub list_key: String,
    pub field_key: String,
    pub operation: Operation,
    pub input_data: Item,
    pub resolved_data: Item,
    pub item: Option<Item>,
    /// The field's current value in `resolved_data`.
    pub value: Option<Value>,
}

/// Arguments of field `beforeOperation` / `afterOperation` stages.
#[derive(Clone)]
pub struct FieldOperationArgs {
    pub context: Context,
    pub list_key: String,
    pub field_key: String,
    pub operation: Operation,
    pub resolved_data: Item,
    pub item: Option<Item>,
    pub original_item: Option<Item>,
}

/// Arguments of a field `resolveOutput` stage.
#[derive(Clone)]
pub struct FieldOutputArgs {
    pub context: Context,
    pub list_key: String,
    pub field_key: String,
    /// The stored value; `None` for virtual fields.
    pub value: Option<Value>,
    /// The item being returned, as stored.
    pub item: Item,
}

// ── Stages ──────────────────────────────────────────────────────────

/// A list-level hook stage.
#[derive(Clone)]
pub enum ListHook {
    ResolveInput(Arc<ListInputFn>),
    ValidateInput(Arc<ValidateFn>),
    BeforeOperation(Arc<ListOperationFn>),
    AfterOperation(Arc<ListOperationFn>),
}

impl fmt::Debug for ListHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResolveInput(_) => "ListHook::ResolveInput",
            Self::ValidateInput(_) => "ListHook::ValidateInput",
            Self::BeforeOperation(_) => "ListHook::BeforeOperation",
            Self::AfterOperation(_) => "ListHook::AfterOperation",
        })
    }
}

impl ListHook {
    /// Transform the whole payload. Runs on create and update.
    pub fn resolve_input<F, Fut>(f: F) -> Self
    where
        F: Fn(ListInputArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Item>> + Send + 'static,
    {
        Self::ResolveInput(Arc::new(move |args| Box::pin(f(args))))
    }

    /// Report problems through [`ValidateInputArgs::add_validation_error`].
    pub fn validate_input<F, Fut>(f: F) -> Self
    where
        F: Fn(ValidateInputArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::ValidateInput(Arc::new(move |args| Box::pin(f(args))))
    }

    pub fn before_operation<F, Fut>(f: F) -> Self
    where
        F: Fn(ListOperationArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::BeforeOperation(Arc::new(move |args| Box::pin(f(args))))
    }

    pub fn after_operation<F, Fut>(f: F) -> Self
    where
        F: Fn(ListOperationArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::AfterOperation(Arc::new(move |args| Box::pin(f(args))))
    }
}

/// A field-level hook stage.
#[derive(Clone)]
pub enum FieldHook {
    /// Returns the new value; `None` removes the field from the payload.
    ResolveInput(Arc<FieldInputFn>),
    BeforeOperation(Arc<FieldOperationFn>),
    AfterOperation(Arc<FieldOperationFn>),
    /// Returns the value to expose; `None` removes the key.
    ResolveOutput(Arc<FieldOutputFn>),
}

impl fmt::Debug for FieldHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResolveInput(_) => "FieldHook::ResolveInput",
            Self::BeforeOperation(_) => "FieldHook::BeforeOperation",
            Self::AfterOperation(_) => "FieldHook::AfterOperation",
            Self::ResolveOutput(_) => "FieldHook::ResolveOutput",
        })
    }
}

impl FieldHook {
    pub fn resolve_input<F, Fut>(f: F) -> Self
    where
        F: Fn(FieldInputArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        Self::ResolveInput(Arc::new(move |args| Box::pin(f(args))))
    }

    pub fn before_operation<F, Fut>(f: F) -> Self
    where
        F: Fn(FieldOperationArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::BeforeOperation(Arc::new(move |args| Box::pin(f(args))))
    }

    pub fn after_operation<F, Fut>(f: F) -> Self
    where
        F: Fn(FieldOperationArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::AfterOperation(Arc::new(move |args| Box::pin(f(args))))
    }

    pub fn resolve_output<F, Fut>(f: F) -> Self
    where
        F: Fn(FieldOutputArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        Self::ResolveOutput(Arc::new(move |args| Box::pin(f(args))))
    }
}

// ── Executor ────────────────────────────────────────────────────────

/// Shared state of one write as it moves through the stages.
pub struct WriteEnvelope<'a> {
    pub context: &'a Context,
    pub list: &'a ListDescriptor,
    pub operation: Operation,
    pub input_data: &'a Item,
    pub item: Option<&'a Item>,
}

impl WriteEnvelope<'_> {
    /// List `resolveInput` stages, threaded through each other.
    ///
    /// # Errors
    ///
    /// [`ListkitError::Hook`] if a stage fails.
    pub async fn list_resolve_input(&self, mut resolved: Item) -> Result<Item, ListkitError> {
        for hook in self.list.hooks() {
            if let ListHook::ResolveInput(f) = hook {
                resolved = f(ListInputArgs {
                    context: self.context.clone(),
                    list_key: self.list.key().to_owned(),
                    operation: self.operation,
                    input_data: self.input_data.clone(),
                    resolved_data: resolved,
                    item: self.item.cloned(),
                })
                .await
                .map_err(ListkitError::hook(self.list.key(), None, "resolveInput"))?;
            }
        }
        Ok(resolved)
    }

    /// Field `resolveInput` stages, for each field present in the payload.
    ///
    /// # Errors
    ///
    /// [`ListkitError::Hook`] if a stage fails.
    pub async fn field_resolve_input(&self, mut resolved: Item) -> Result<Item, ListkitError> {
        for field in self.list.fields() {
            if !resolved.contains_key(field.name()) {
                continue;
            }
            for hook in field.hooks() {
                let FieldHook::ResolveInput(f) = hook else {
                    continue;
                };
                let value = f(FieldInputArgs {
                    context: self.context.clone(),
                    list_key: self.list.key().to_owned(),
                    field_key: field.name().to_owned(),
                    operation: self.operation,
                    input_data: self.input_data.clone(),
                    resolved_data: resolved.clone(),
                    item: self.item.cloned(),
                    value: resolved.get(field.name()).cloned(),
                })
                .await
                .map_err(ListkitError::hook(
                    self.list.key(),
                    Some(field.name()),
                    "resolveInput",
                ))?;
                match value {
                    Some(v) => {
                        resolved.insert(field.name().to_owned(), v);
                    }
                    None => {
                        resolved.remove(field.name());
                        break;
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// List `validateInput` stages; returns every collected message.
    ///
    /// # Errors
    ///
    /// [`ListkitError::Hook`] if a stage fails (as opposed to reporting).
    pub async fn validate_input(&self, resolved: &Item) -> Result<Vec<String>, ListkitError> {
        let sink = ValidationSink::default();
        for hook in self.list.hooks() {
            if let ListHook::ValidateInput(f) = hook {
                f(ValidateInputArgs {
                    context: self.context.clone(),
                    list_key: self.list.key().to_owned(),
                    operation: self.operation,
                    input_data: self.input_data.clone(),
                    resolved_data: resolved.clone(),
                    item: self.item.cloned(),
                    errors: sink.clone(),
                })
                .await
                .map_err(ListkitError::hook(self.list.key(), None, "validateInput"))?;
            }
        }
        Ok(sink.take())
    }
}

/// Which side of the persistence call an operation hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    fn hook_name(self) -> &'static str {
        match self {
            Self::Before => "beforeOperation",
            Self::After => "afterOperation",
        }
    }
}

/// Inputs of the before/after stages of one operation.
pub struct OperationHooks<'a> {
    pub context: &'a Context,
    pub list: &'a ListDescriptor,
    pub operation: Operation,
    pub resolved_data: &'a Item,
    pub item: Option<&'a Item>,
    pub original_item: Option<&'a Item>,
}

impl OperationHooks<'_> {
    /// List `beforeOperation` or `afterOperation` stages.
    ///
    /// # Errors
    ///
    /// [`ListkitError::Hook`] if a stage fails.
    pub async fn run_list(&self, phase: Phase) -> Result<(), ListkitError> {
        for hook in self.list.hooks() {
            let f = match (phase, hook) {
                (Phase::Before, ListHook::BeforeOperation(f))
                | (Phase::After, ListHook::AfterOperation(f)) => f,
                _ => continue,
            };
            f(ListOperationArgs {
                context: self.context.clone(),
                list_key: self.list.key().to_owned(),
                operation: self.operation,
                resolved_data: self.resolved_data.clone(),
                item: self.item.cloned(),
                original_item: self.original_item.cloned(),
            })
            .await
            .map_err(ListkitError::hook(self.list.key(), None, phase.hook_name()))?;
        }
        debug!(list = self.list.key(), operation = %self.operation, ?phase, "list hooks done");
        Ok(())
    }

    /// Field `beforeOperation` or `afterOperation` stages for `fields`.
    ///
    /// # Errors
    ///
    /// [`ListkitError::Hook`] if a stage fails.
    pub async fn run_fields<'f>(
        &self,
        phase: Phase,
        fields: impl IntoIterator<Item = &'f FieldDescriptor>,
    ) -> Result<(), ListkitError> {
        for field in fields {
            for hook in field.hooks() {
                let f = match (phase, hook) {
                    (Phase::Before, FieldHook::BeforeOperation(f))
                    | (Phase::After, FieldHook::AfterOperation(f)) => f,
                    _ => continue,
                };
                f(FieldOperationArgs {
                    context: self.context.clone(),
                    list_key: self.list.key().to_owned(),
                    field_key: field.name().to_owned(),
                    operation: self.operation,
                    resolved_data: self.resolved_data.clone(),
                    item: self.item.cloned(),
                    original_item: self.original_item.cloned(),
                })
                .await
                .map_err(ListkitError::hook(
                    self.list.key(),
                    Some(field.name()),
                    phase.hook_name(),
                ))?;
            }
        }
        Ok(())
    }
}

/// Fields of `list` whose key (or foreign-key column) is present on `item`.
pub fn fields_on_item<'a>(
    list: &'a ListDescriptor,
    item: &'a Item,
) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
    list.fields().filter(move |field| {
        item.contains_key(field.name())
            || list
                .foreign_key_column(field.name())
                .is_some_and(|column| item.contains_key(column))
    })
}

/// Fields of `list` present as keys of `data`.
pub fn fields_in_data<'a>(
    list: &'a ListDescriptor,
    data: &'a Item,
) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
    list.fields().filter(move |field| data.contains_key(field.name()))
}
