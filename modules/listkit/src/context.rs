//! `Stack` (long-lived wiring) and `Context` (one logical request).

use std::any::Any;
use std::sync::Arc;

use listkit_db::Database;
use listkit_security::Session;
use tracing::debug;

use crate::config::ListkitConfig;
use crate::domain::pipeline::ListOperations;
use crate::error::{ConfigError, ListkitError};
use crate::plugins::{PluginRuntime, PluginServices, RuntimeInit};
use crate::schema::Schema;
use crate::storage::{NoStorage, Storage};

struct StackInner {
    schema: Arc<Schema>,
    database: Arc<dyn Database>,
    storage: Arc<dyn Storage>,
    runtimes: Vec<PluginRuntime>,
    config: Arc<ListkitConfig>,
}

/// Schema, persistence, storage and configuration, wired once per process.
#[derive(Clone)]
pub struct Stack {
    inner: Arc<StackInner>,
}

impl Stack {
    #[must_use]
    pub fn builder() -> StackBuilder {
        StackBuilder::default()
    }

    /// A context for one request. Plugin runtime factories run here.
    #[must_use]
    pub fn context(&self, session: Option<Session>) -> Context {
        let plugins = PluginServices::build(
            &self.inner.runtimes,
            &RuntimeInit {
                session: session.as_ref(),
                database: &self.inner.database,
                storage: &self.inner.storage,
                config: &self.inner.config,
            },
        );
        debug!(
            signed_in = session.is_some(),
            plugins = self.inner.runtimes.len(),
            "context created"
        );
        Context {
            shared: Arc::new(Shared {
                stack: Arc::clone(&self.inner),
                session,
                plugins,
            }),
            sudo: false,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }
}

#[derive(Default)]
pub struct StackBuilder {
    schema: Option<Schema>,
    database: Option<Arc<dyn Database>>,
    storage: Option<Arc<dyn Storage>>,
    runtimes: Vec<PluginRuntime>,
    config: ListkitConfig,
}

impl StackBuilder {
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Extra runtime service, alongside those contributed by schema plugins.
    #[must_use]
    pub fn plugin(mut self, runtime: PluginRuntime) -> Self {
        self.runtimes.push(runtime);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ListkitConfig) -> Self {
        self.config = config;
        self
    }

    /// # Errors
    ///
    /// [`ConfigError::MissingComponent`] without a schema or a database.
    pub fn build(self) -> Result<Stack, ConfigError> {
        let schema = self.schema.ok_or(ConfigError::MissingComponent("schema"))?;
        let database = self
            .database
            .ok_or(ConfigError::MissingComponent("database"))?;
        let mut runtimes = schema.runtimes().to_vec();
        runtimes.extend(self.runtimes);
        Ok(Stack {
            inner: Arc::new(StackInner {
                schema: Arc::new(schema),
                database,
                storage: self.storage.unwrap_or_else(|| Arc::new(NoStorage)),
                runtimes,
                config: Arc::new(self.config),
            }),
        })
    }
}

struct Shared {
    stack: Arc<StackInner>,
    session: Option<Session>,
    plugins: PluginServices,
}

/// Per-request access context. Cloning is shallow.
///
/// [`Context::sudo`] derives a context that shares everything with this one
/// except the access bypass flag.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
    sudo: bool,
}

impl Context {
    /// A context that bypasses operation and field access rules.
    /// Hooks and validation still run. Idempotent.
    #[must_use]
    pub fn sudo(&self) -> Context {
        Context {
            shared: Arc::clone(&self.shared),
            sudo: true,
        }
    }

    #[must_use]
    pub fn is_sudo(&self) -> bool {
        self.sudo
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.shared.session.as_ref()
    }

    #[must_use]
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.shared.stack.database
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.shared.stack.storage
    }

    #[must_use]
    pub fn config(&self) -> &ListkitConfig {
        &self.shared.stack.config
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.shared.stack.schema
    }

    /// Runtime service `name`, if registered with type `T`.
    #[must_use]
    pub fn plugin<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.shared.plugins.get(name)
    }

    /// `true` if both contexts share session, persistence and plugin services.
    #[must_use]
    pub fn same_identity(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Operations on list `key`.
    ///
    /// # Errors
    ///
    /// [`ListkitError::UnknownList`] if the schema has no such list.
    pub fn list(&self, key: &str) -> Result<ListOperations, ListkitError> {
        let list = self
            .schema()
            .list(key)
            .ok_or_else(|| ListkitError::UnknownList(key.to_owned()))?;
        Ok(ListOperations::new(self.clone(), Arc::clone(list)))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("session", &self.session())
            .field("sudo", &self.sudo)
            .finish_non_exhaustive()
    }
}
