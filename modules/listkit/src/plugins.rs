//! Plugins: per-request runtime services and build-time list hooks.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use listkit_db::Database;
use listkit_security::Session;

use crate::config::ListkitConfig;
use crate::domain::hooks::ListHook;
use crate::storage::Storage;

/// What a runtime factory sees when a context is created.
pub struct RuntimeInit<'a> {
    pub session: Option<&'a Session>,
    pub database: &'a Arc<dyn Database>,
    pub storage: &'a Arc<dyn Storage>,
    pub config: &'a ListkitConfig,
}

pub type RuntimeService = Arc<dyn Any + Send + Sync>;
type RuntimeFactory = dyn Fn(&RuntimeInit<'_>) -> RuntimeService + Send + Sync;

/// A named runtime factory. Runs once per [`Stack::context`](crate::Stack::context).
#[derive(Clone)]
pub struct PluginRuntime {
    name: String,
    factory: Arc<RuntimeFactory>,
}

impl fmt::Debug for PluginRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRuntime")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PluginRuntime {
    pub fn new<F, T>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&RuntimeInit<'_>) -> T + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        Self {
            name: name.into(),
            factory: Arc::new(move |init| Arc::new(factory(init)) as RuntimeService),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A bundle of runtime factories and list hooks.
#[derive(Debug, Clone)]
pub struct Plugin {
    name: String,
    runtimes: Vec<PluginRuntime>,
    list_hooks: Vec<(String, ListHook)>,
}

impl Plugin {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runtimes: Vec::new(),
            list_hooks: Vec::new(),
        }
    }

    /// Register the plugin's runtime service under the plugin's name.
    #[must_use]
    pub fn runtime<F, T>(mut self, factory: F) -> Self
    where
        F: Fn(&RuntimeInit<'_>) -> T + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        self.runtimes.push(PluginRuntime::new(self.name.clone(), factory));
        self
    }

    /// Append `hook` to `list`'s hooks, after the list's own stages.
    #[must_use]
    pub fn list_hook(mut self, list: impl Into<String>, hook: ListHook) -> Self {
        self.list_hooks.push((list.into(), hook));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, Vec<PluginRuntime>, Vec<(String, ListHook)>) {
        (self.name, self.runtimes, self.list_hooks)
    }
}

/// Read-only runtime services of one context.
#[derive(Default, Clone)]
pub struct PluginServices {
    services: HashMap<String, RuntimeService>,
}

impl PluginServices {
    pub(crate) fn build(runtimes: &[PluginRuntime], init: &RuntimeInit<'_>) -> Self {
        let services = runtimes
            .iter()
            .map(|runtime| (runtime.name.clone(), (runtime.factory)(init)))
            .collect();
        Self { services }
    }

    /// The service registered as `name`, if it has type `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        Arc::clone(self.services.get(name)?).downcast::<T>().ok()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}
