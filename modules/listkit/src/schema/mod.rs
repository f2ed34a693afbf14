//! Schema descriptors and the builder that validates them.
//!
//! Everything here is checked once, at [`SchemaBuilder::build`]; a schema
//! that builds never fails a request because of its own shape.

pub mod field;
pub mod list;
pub mod relationship;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use listkit_db::ListTopology;
use listkit_security::system_fields;
use tracing::info;

pub use field::{DefaultValue, Field, FieldAccess, FieldDescriptor, FieldKind, FieldValidation};
pub use list::{List, ListAccess, ListDescriptor};

use crate::domain::hooks::ListHook;
use crate::error::ConfigError;
use crate::plugins::{Plugin, PluginRuntime};

type BuiltList = (String, Vec<FieldDescriptor>, ListAccess, Vec<ListHook>);

/// The built registry of lists.
#[derive(Debug, Default)]
pub struct Schema {
    lists: BTreeMap<String, Arc<ListDescriptor>>,
    runtimes: Vec<PluginRuntime>,
}

impl Schema {
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    #[must_use]
    pub fn list(&self, key: &str) -> Option<&Arc<ListDescriptor>> {
        self.lists.get(key)
    }

    pub fn lists(&self) -> impl Iterator<Item = &Arc<ListDescriptor>> {
        self.lists.values()
    }

    /// Relation storage of every list, for persistence engines.
    #[must_use]
    pub fn topology(&self) -> Vec<ListTopology> {
        self.lists.values().map(|l| l.topology().clone()).collect()
    }

    /// Runtime factories contributed by plugins.
    #[must_use]
    pub fn runtimes(&self) -> &[PluginRuntime] {
        &self.runtimes
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    lists: Vec<List>,
    plugins: Vec<Plugin>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn list(mut self, list: List) -> Self {
        self.lists.push(list);
        self
    }

    #[must_use]
    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Validate and freeze the schema.
    ///
    /// # Errors
    ///
    /// The first [`ConfigError`] found.
    pub fn build(self) -> Result<Schema, ConfigError> {
        let mut seen = HashSet::new();
        for list in &self.lists {
            if !seen.insert(list.key.as_str()) {
                return Err(ConfigError::DuplicateList {
                    list: list.key.clone(),
                });
            }
        }

        let mut built: Vec<BuiltList> = Vec::with_capacity(self.lists.len());
        for list in self.lists {
            let mut names = HashSet::new();
            let mut fields = Vec::with_capacity(list.fields.len());
            for (name, field) in list.fields {
                if !names.insert(name.clone()) {
                    return Err(ConfigError::DuplicateField {
                        list: list.key.clone(),
                        field: name,
                    });
                }
                check_field(&list.key, &name, &field)?;
                fields.push(FieldDescriptor::new(&name, field));
            }
            built.push((list.key, fields, list.access, list.hooks));
        }

        let views: Vec<relationship::ListFields<'_>> = built
            .iter()
            .map(|(key, fields, _, _)| (key.as_str(), fields.as_slice()))
            .collect();
        let mut relations = relationship::resolve(&views)?;

        let mut lists = BTreeMap::new();
        for (key, fields, access, hooks) in built {
            let topology = ListTopology {
                name: key.clone(),
                relations: relations.remove(&key).unwrap_or_default(),
                unique_fields: fields
                    .iter()
                    .filter(|f| f.is_unique())
                    .map(|f| f.name().to_owned())
                    .collect(),
            };
            let descriptor = ListDescriptor::new(key.clone(), fields, access, hooks, topology);
            lists.insert(key, descriptor);
        }

        let mut runtimes = Vec::new();
        for plugin in self.plugins {
            let (name, plugin_runtimes, list_hooks) = plugin.into_parts();
            for (list, hook) in list_hooks {
                let descriptor = lists
                    .get_mut(&list)
                    .ok_or_else(|| ConfigError::UnknownPluginTarget {
                        plugin: name.clone(),
                        list,
                    })?;
                descriptor.push_hook(hook);
            }
            runtimes.extend(plugin_runtimes);
        }

        info!(lists = lists.len(), plugins = runtimes.len(), "schema built");
        Ok(Schema {
            lists: lists.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            runtimes,
        })
    }
}

/// Modifier checks that need nothing beyond the field itself.
fn check_field(list: &str, name: &str, field: &Field) -> Result<(), ConfigError> {
    if system_fields::is_system(name) {
        return Err(ConfigError::ReservedField {
            list: list.to_owned(),
            field: name.to_owned(),
        });
    }
    let invalid = |reason: &str| ConfigError::InvalidField {
        list: list.to_owned(),
        field: name.to_owned(),
        reason: reason.to_owned(),
    };
    let v = &field.validation;

    if field.kind == FieldKind::Virtual {
        let modifier = if field.unique {
            Some("unique")
        } else if field.default.is_some() {
            Some("defaulted")
        } else if v.required {
            Some("required")
        } else if field.foreign_key {
            Some("a foreign key")
        } else {
            None
        };
        if let Some(modifier) = modifier {
            return Err(ConfigError::VirtualWithStorage {
                list: list.to_owned(),
                field: name.to_owned(),
                modifier,
            });
        }
    }

    let textual = matches!(field.kind, FieldKind::Text | FieldKind::Password);
    let numeric = matches!(field.kind, FieldKind::Integer | FieldKind::Decimal);
    let relationship = matches!(field.kind, FieldKind::Relationship { .. });

    if (v.min_length.is_some() || v.max_length.is_some()) && !textual {
        return Err(invalid("length bounds apply to text and password fields only"));
    }
    if let (Some(min), Some(max)) = (v.min_length, v.max_length)
        && min > max
    {
        return Err(invalid("minimum length exceeds maximum length"));
    }
    if (v.min.is_some() || v.max.is_some()) && !numeric {
        return Err(invalid("min/max apply to integer and decimal fields only"));
    }
    if field.default == Some(DefaultValue::Now) && field.kind != FieldKind::Timestamp {
        return Err(invalid("default_now applies to timestamp fields only"));
    }
    if relationship && (field.unique || field.default.is_some() || v.required) {
        return Err(invalid("relationships cannot be unique, defaulted or required"));
    }
    if field.foreign_key && !relationship {
        return Err(invalid("foreign_key applies to relationships only"));
    }
    if let (FieldKind::Select { options }, Some(DefaultValue::Value(value))) =
        (&field.kind, &field.default)
        && !value.as_str().is_some_and(|s| options.iter().any(|o| o == s))
    {
        return Err(invalid("default is not one of the select options"));
    }
    Ok(())
}
