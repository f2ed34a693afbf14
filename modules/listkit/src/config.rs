//! Runtime configuration.
//!
//! Schema (lists, fields, hooks, access rules) is code-defined because hooks
//! and predicates are closures. Only the pipeline's numeric limits come from
//! here.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment prefix; `__` separates sections (`LISTKIT_NESTED__MAX_DEPTH=4`).
pub const ENV_PREFIX: &str = "LISTKIT_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListkitConfig {
    pub nested: NestedConfig,
    pub output: OutputConfig,
    pub query: QueryConfig,
}

/// Bounds on nested relationship writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NestedConfig {
    /// Maximum recursion depth of nested `create`/`update` writes.
    pub max_depth: usize,
}

impl Default for NestedConfig {
    fn default() -> Self {
        Self { max_depth: 8 }
    }
}

/// Bounds on output filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Relation hops filtered before deeper relation objects are dropped.
    pub max_depth: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { max_depth: 5 }
    }
}

/// `find_many` paging defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// `take` applied when the caller supplies none.
    pub default_take: Option<u64>,
    /// Upper bound on any `take`.
    pub max_take: Option<u64>,
}

impl QueryConfig {
    /// Effective `take` for a request.
    #[must_use]
    pub fn effective_take(&self, requested: Option<u64>) -> Option<u64> {
        let take = requested.or(self.default_take);
        match (take, self.max_take) {
            (Some(t), Some(max)) => Some(t.min(max)),
            (None, Some(max)) => Some(max),
            (t, None) => t,
        }
    }
}

impl ListkitConfig {
    /// Load defaults, then the optional YAML file, then `LISTKIT_*` env vars.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] if a source is malformed or has unknown keys.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ListkitConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: ListkitConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;
        tracing::debug!(?config, "listkit configuration loaded");
        Ok(config)
    }
}
