#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Persistence contract for listkit.
//!
//! The operation pipeline never talks to a storage engine directly: it goes
//! through a [`Database`] that hands out one [`ListClient`] per list. Writes
//! are described by [`WriteData`] (scalar columns plus per-relation
//! [`RelationWrite`]s); the engine decides how a relation is stored from the
//! [`ListTopology`] it was built with.
//!
//! [`MemoryDatabase`] is a complete in-process engine. It records every call
//! so callers can assert that a denied operation never reached persistence.

pub mod args;
pub mod client;
pub mod error;
pub mod memory;
pub mod topology;
pub mod write;

pub use args::{CountArgs, FindManyArgs, Include, OrderBy, SortOrder};
pub use client::{Database, ListClient};
pub use error::PersistenceError;
pub use memory::{CallKind, MemoryDatabase, RecordedCall};
pub use topology::{JoinSide, ListTopology, RelationStorage, RelationTopology};
pub use write::{Item, RelationWrite, WriteData};
