#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Access-controlled list operations.
//!
//! A [`Schema`] of lists and fields is built once. A [`Stack`] wires it to a
//! persistence engine and storage; every request gets a [`Context`] from
//! [`Stack::context`], and every operation on a list runs through the same
//! pipeline of access checks, hooks, validation, nested relationship writes
//! and output filtering.

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod password;
pub mod plugins;
pub mod schema;
pub mod server_action;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use config::ListkitConfig;
pub use context::{Context, Stack, StackBuilder};
pub use domain::access::{AccessArgs, AccessOutcome, AccessRule};
pub use domain::hooks::{
    FieldHook, FieldInputArgs, FieldOperationArgs, FieldOutputArgs, ListHook, ListInputArgs,
    ListOperationArgs, ValidateInputArgs,
};
pub use domain::pipeline::ListOperations;
pub use domain::{NestedOperation, Operation};
pub use error::{ConfigError, ListkitError, ValidationError};
pub use plugins::{Plugin, PluginRuntime, RuntimeInit};
pub use schema::{Field, FieldAccess, List, ListAccess, Schema};
pub use server_action::{ActionError, ActionKind, ServerAction, server_action};
pub use storage::{FileUpload, MemoryStorage, NoStorage, Storage, StorageError, StoredFile};

pub use listkit_db::{CountArgs, FindManyArgs, Include, Item, OrderBy};
pub use listkit_security::{Filter, Session};
