//! Nested relationship writes.
//!
//! A relationship value in a write payload is an object of sub-operations:
//!
//! ```json
//! { "connect": {"id": "u1"} }
//! { "create": [{"title": "a"}, {"title": "b"}] }
//! { "update": {"where": {"id": "p1"}, "data": {"title": "c"}} }
//! { "disconnect": true }
//! ```
//!
//! Each sub-operation is checked against the target list's own access rules
//! and, for `create`/`update`, runs the target's full pipeline. A denial here
//! is an explicit [`ListkitError::RelationAccess`], never a silent `None`.
//! Everything resolves before the parent write is sent to persistence.
//!
//! Nested `update` only reaches items already linked to the parent, so it
//! is rejected when the parent is being created.

use futures::future::BoxFuture;
use listkit_db::{Include, Item, PersistenceError, RelationWrite, WriteData};
use listkit_security::{Filter, system_fields};
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::domain::access::check_list_access;
use crate::domain::pipeline::{client, create, locate, persistence_error, update};
use crate::domain::{NestedOperation, Operation};
use crate::error::ListkitError;
use crate::schema::{FieldDescriptor, ListDescriptor};

/// Split `data` into scalar columns and resolved relation writes.
///
/// `parent` is the stored item on update, `None` on create.
///
/// Nested creates persist before the parent write. Where the foreign key
/// lives on the created child, the link is set by the parent write, so the
/// child's `afterOperation` stages see it unlinked.
///
/// # Errors
///
/// [`ListkitError::RelationAccess`] when a target list denies a
/// sub-operation, [`ListkitError::InvalidNestedWrite`] for malformed
/// payloads, [`ListkitError::NestingTooDeep`] past the configured depth, and
/// anything the nested pipelines raise.
pub fn resolve<'a>(
    ctx: &'a Context,
    list: &'a ListDescriptor,
    data: Item,
    parent: Option<&'a Item>,
    depth: usize,
) -> BoxFuture<'a, Result<WriteData, ListkitError>> {
    Box::pin(async move {
        let mut out = WriteData::default();
        for (key, value) in data {
            let Some(field) = list.field(&key).filter(|f| f.is_relationship()) else {
                out.scalars.insert(key, value);
                continue;
            };
            let relation = Relation::new(ctx, list, field, parent, depth)?;
            let write = relation.resolve(value).await?;
            if !write.is_empty() {
                out.relate(key, write);
            }
        }
        Ok(out)
    })
}

/// Sub-operations of one relationship value.
#[derive(Debug, Default)]
struct RelationInput {
    connect: Vec<Value>,
    create: Vec<Item>,
    update: Vec<(Value, Item)>,
    disconnect: Vec<Value>,
    disconnect_all: bool,
}

struct Relation<'a> {
    ctx: &'a Context,
    list: &'a ListDescriptor,
    field: &'a FieldDescriptor,
    target: &'a ListDescriptor,
    parent: Option<&'a Item>,
    depth: usize,
}

impl<'a> Relation<'a> {
    fn new(
        ctx: &'a Context,
        list: &'a ListDescriptor,
        field: &'a FieldDescriptor,
        parent: Option<&'a Item>,
        depth: usize,
    ) -> Result<Self, ListkitError> {
        let target_key = list
            .relation(field.name())
            .map(|r| r.target_list.as_str())
            .ok_or_else(|| ListkitError::UnknownField {
                list: list.key().to_owned(),
                field: field.name().to_owned(),
            })?;
        let target = ctx
            .schema()
            .list(target_key)
            .ok_or_else(|| ListkitError::UnknownList(target_key.to_owned()))?;
        Ok(Self {
            ctx,
            list,
            field,
            target,
            parent,
            depth,
        })
    }

    async fn resolve(&self, value: Value) -> Result<RelationWrite, ListkitError> {
        let input = self.parse(value)?;
        if !input.update.is_empty() && self.parent.is_none() {
            return Err(self.invalid("update requires an existing parent item"));
        }
        let mut write = RelationWrite {
            disconnect_all: input.disconnect_all,
            ..RelationWrite::default()
        };

        if input.disconnect_all {
            self.require_update(NestedOperation::Disconnect).await?;
        }
        for where_ in input.disconnect {
            let item = self
                .probe(NestedOperation::Disconnect, Filter::from_json(&where_)?)
                .await?;
            write.disconnect.push(id_of(&item));
        }
        for where_ in input.connect {
            let item = self
                .probe(NestedOperation::Connect, Filter::from_json(&where_)?)
                .await?;
            write.connect.push(id_of(&item));
        }
        for data in input.create {
            let created = self.create(data).await?;
            write.connect.push(id_of(&created));
        }
        for (where_, data) in input.update {
            self.update(&where_, data).await?;
        }

        debug!(
            list = self.list.key(),
            field = self.field.name(),
            connect = write.connect.len(),
            disconnect = write.disconnect.len(),
            clear = write.disconnect_all,
            "nested write resolved"
        );
        Ok(write)
    }

    fn parse(&self, value: Value) -> Result<RelationInput, ListkitError> {
        let Value::Object(ops) = value else {
            return Err(self.invalid("expected an object of nested operations"));
        };
        if ops.contains_key("connect") && ops.contains_key("create") {
            return Err(self.invalid("connect and create cannot be combined"));
        }

        let mut input = RelationInput::default();
        for (op, value) in ops {
            match op.as_str() {
                "connect" => input.connect = self.entries(value)?,
                "create" => {
                    input.create = self
                        .entries(value)?
                        .into_iter()
                        .map(|v| self.object(v, "create"))
                        .collect::<Result<_, _>>()?;
                }
                "update" => {
                    input.update = self
                        .entries(value)?
                        .into_iter()
                        .map(|v| self.update_entry(v))
                        .collect::<Result<_, _>>()?;
                }
                "disconnect" => match value {
                    Value::Bool(all) => input.disconnect_all = all,
                    Value::Object(_) if !self.field.is_many() => input.disconnect_all = true,
                    other => input.disconnect = self.entries(other)?,
                },
                other => return Err(self.invalid(&format!("unsupported nested operation '{other}'"))),
            }
        }
        Ok(input)
    }

    /// A single object, or for to-many relations an array of them.
    fn entries(&self, value: Value) -> Result<Vec<Value>, ListkitError> {
        match value {
            Value::Object(_) => Ok(vec![value]),
            Value::Array(items) if self.field.is_many() => {
                if items.iter().all(Value::is_object) {
                    Ok(items)
                } else {
                    Err(self.invalid("expected an array of objects"))
                }
            }
            Value::Array(_) => Err(self.invalid("expected a single object")),
            _ => Err(self.invalid("expected an object")),
        }
    }

    fn object(&self, value: Value, what: &str) -> Result<Item, ListkitError> {
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(self.invalid(&format!("{what} expects an object"))),
        }
    }

    fn update_entry(&self, value: Value) -> Result<(Value, Item), ListkitError> {
        let mut entry = self.object(value, "update")?;
        let where_ = entry
            .remove("where")
            .filter(Value::is_object)
            .ok_or_else(|| self.invalid("update requires a 'where' object"))?;
        let data = entry
            .remove("data")
            .ok_or_else(|| self.invalid("update requires a 'data' object"))
            .and_then(|v| self.object(v, "update data"))?;
        Ok((where_, data))
    }

    /// Target update access for clearing a relation. No single item is
    /// located, so predicate rules see `None`.
    async fn require_update(&self, operation: NestedOperation) -> Result<(), ListkitError> {
        let scope = check_list_access(self.ctx, self.target, Operation::Update, None, None).await?;
        if scope.is_deny_all() {
            return Err(self.denied(operation));
        }
        Ok(())
    }

    /// Find the target item named by `where_` that the caller may update.
    async fn probe(&self, operation: NestedOperation, where_: Filter) -> Result<Item, ListkitError> {
        match locate(self.ctx, self.target, Operation::Update, where_, None).await? {
            Some(item) => Ok(item),
            None if self.ctx.is_sudo() => Err(PersistenceError::RecordNotFound {
                list: self.target.key().to_owned(),
            }
            .into()),
            None => Err(self.denied(operation)),
        }
    }

    /// Ids of the target items currently linked to the parent.
    async fn linked_ids(&self) -> Result<Vec<Value>, ListkitError> {
        let Some(parent) = self.parent else {
            return Ok(Vec::new());
        };
        let include = Include::new().relation(self.field.name());
        let found = client(self.ctx, self.list)?
            .find_first(Some(&Filter::id(id_of(parent))), Some(&include))
            .await
            .map_err(persistence_error(self.list))?;
        let linked = found
            .and_then(|mut item| item.remove(self.field.name()))
            .unwrap_or(Value::Null);
        Ok(match linked {
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_object)
                .map(id_of)
                .collect(),
            Value::Object(item) => vec![id_of(&item)],
            _ => Vec::new(),
        })
    }

    async fn create(&self, data: Item) -> Result<Item, ListkitError> {
        self.check_depth()?;
        let scope =
            check_list_access(self.ctx, self.target, Operation::Create, None, Some(&data)).await?;
        if scope.is_deny_all() {
            return Err(self.denied(NestedOperation::Create));
        }
        create::run(self.ctx, self.target, data, self.depth + 1).await
    }

    async fn update(&self, where_: &Value, data: Item) -> Result<Item, ListkitError> {
        self.check_depth()?;
        let linked = Filter::r#in(system_fields::ID, self.linked_ids().await?);
        let where_ = Filter::from_json(where_)?.and(linked);
        let existing = self.probe(NestedOperation::Update, where_).await?;
        update::run(self.ctx, self.target, existing, data, self.depth + 1).await
    }

    fn check_depth(&self) -> Result<(), ListkitError> {
        let max_depth = self.ctx.config().nested.max_depth;
        if self.depth + 1 > max_depth {
            return Err(ListkitError::NestingTooDeep { max_depth });
        }
        Ok(())
    }

    fn denied(&self, operation: NestedOperation) -> ListkitError {
        debug!(
            list = self.list.key(),
            field = self.field.name(),
            target = self.target.key(),
            %operation,
            "nested operation denied"
        );
        ListkitError::relation_access(self.target.key(), self.field.name(), operation)
    }

    fn invalid(&self, reason: &str) -> ListkitError {
        ListkitError::invalid_nested(self.list.key(), self.field.name(), reason)
    }
}

fn id_of(item: &Item) -> Value {
    item.get(system_fields::ID).cloned().unwrap_or(Value::Null)
}
