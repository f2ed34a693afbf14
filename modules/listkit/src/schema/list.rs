use std::future::Future;

use listkit_db::{Item, ListTopology, RelationStorage, RelationTopology};

use crate::domain::Operation;
use crate::domain::access::AccessRule;
use crate::domain::hooks::{ListHook, ListInputArgs, ListOperationArgs, ValidateInputArgs};
use crate::schema::field::{Field, FieldDescriptor};

/// Operation-level rules. Everything defaults to allow.
#[derive(Debug, Clone, Default)]
pub struct ListAccess {
    query: AccessRule,
    create: AccessRule,
    update: AccessRule,
    delete: AccessRule,
}

impl ListAccess {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, rule: impl Into<AccessRule>) -> Self {
        self.query = rule.into();
        self
    }

    #[must_use]
    pub fn create(mut self, rule: impl Into<AccessRule>) -> Self {
        self.create = rule.into();
        self
    }

    #[must_use]
    pub fn update(mut self, rule: impl Into<AccessRule>) -> Self {
        self.update = rule.into();
        self
    }

    #[must_use]
    pub fn delete(mut self, rule: impl Into<AccessRule>) -> Self {
        self.delete = rule.into();
        self
    }

    /// Same rule for every operation.
    #[must_use]
    pub fn all(rule: impl Into<AccessRule>) -> Self {
        let rule = rule.into();
        Self {
            query: rule.clone(),
            create: rule.clone(),
            update: rule.clone(),
            delete: rule,
        }
    }

    #[must_use]
    pub fn rule(&self, operation: Operation) -> &AccessRule {
        match operation {
            Operation::Query => &self.query,
            Operation::Create => &self.create,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }
}

/// Declarative list definition, turned into a [`ListDescriptor`] by
/// [`SchemaBuilder::build`](crate::schema::SchemaBuilder::build).
#[derive(Debug, Clone)]
pub struct List {
    pub(crate) key: String,
    pub(crate) fields: Vec<(String, Field)>,
    pub(crate) access: ListAccess,
    pub(crate) hooks: Vec<ListHook>,
}

impl List {
    #[must_use]
    pub fn builder(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Vec::new(),
            access: ListAccess::default(),
            hooks: Vec::new(),
        }
    }

    /// Add a field. Declaration order is the order field hooks run in.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    #[must_use]
    pub fn access(mut self, access: ListAccess) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn hook(mut self, hook: ListHook) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn resolve_input<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ListInputArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Item>> + Send + 'static,
    {
        self.hook(ListHook::resolve_input(f))
    }

    #[must_use]
    pub fn validate_input<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ValidateInputArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hook(ListHook::validate_input(f))
    }

    #[must_use]
    pub fn before_operation<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ListOperationArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hook(ListHook::before_operation(f))
    }

    #[must_use]
    pub fn after_operation<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ListOperationArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hook(ListHook::after_operation(f))
    }
}

/// A built, immutable list.
#[derive(Debug)]
pub struct ListDescriptor {
    key: String,
    fields: Vec<FieldDescriptor>,
    access: ListAccess,
    hooks: Vec<ListHook>,
    topology: ListTopology,
}

impl ListDescriptor {
    pub(crate) fn new(
        key: String,
        fields: Vec<FieldDescriptor>,
        access: ListAccess,
        hooks: Vec<ListHook>,
        topology: ListTopology,
    ) -> Self {
        Self {
            key,
            fields,
            access,
            hooks,
            topology,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name() == name)
    }

    #[must_use]
    pub fn access(&self) -> &ListAccess {
        &self.access
    }

    #[must_use]
    pub fn hooks(&self) -> &[ListHook] {
        &self.hooks
    }

    #[must_use]
    pub fn topology(&self) -> &ListTopology {
        &self.topology
    }

    #[must_use]
    pub fn relation(&self, field: &str) -> Option<&RelationTopology> {
        self.topology.relation(field)
    }

    /// The column holding the foreign key of relationship `field`, when it
    /// lives on this list's rows.
    #[must_use]
    pub fn foreign_key_column(&self, field: &str) -> Option<&str> {
        match &self.relation(field)?.storage {
            RelationStorage::LocalKey { column } => Some(column),
            RelationStorage::RemoteKey { .. } | RelationStorage::JoinTable { .. } => None,
        }
    }

    /// The relationship field whose foreign key is stored in `column`.
    #[must_use]
    pub fn field_for_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.topology
            .relations
            .iter()
            .find(|r| matches!(&r.storage, RelationStorage::LocalKey { column: c } if c == column))
            .and_then(|r| self.field(&r.field))
    }

    pub(crate) fn push_hook(&mut self, hook: ListHook) {
        self.hooks.push(hook);
    }
}
