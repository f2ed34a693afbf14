use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// A stored or in-flight record: column name to JSON value.
pub type Item = Map<String, Value>;

/// Link changes for one relation field.
///
/// Ids are the target list's primary keys. `disconnect_all` clears every
/// existing link before `connect` is applied, so "replace" is
/// `disconnect_all + connect`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationWrite {
    pub connect: Vec<Value>,
    pub disconnect: Vec<Value>,
    pub disconnect_all: bool,
}

impl RelationWrite {
    #[must_use]
    pub fn connect(ids: Vec<Value>) -> Self {
        Self {
            connect: ids,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn disconnect(ids: Vec<Value>) -> Self {
        Self {
            disconnect: ids,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn clear() -> Self {
        Self {
            disconnect_all: true,
            ..Self::default()
        }
    }

    /// Fold another write for the same relation into this one.
    pub fn merge(&mut self, other: RelationWrite) {
        self.connect.extend(other.connect);
        self.disconnect.extend(other.disconnect);
        self.disconnect_all |= other.disconnect_all;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connect.is_empty() && self.disconnect.is_empty() && !self.disconnect_all
    }
}

/// The payload of a `create` or `update` call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteData {
    /// Scalar columns. Never contains relation fields or system columns.
    pub scalars: Item,
    /// Relation changes keyed by relation field name.
    pub relations: BTreeMap<String, RelationWrite>,
}

impl WriteData {
    #[must_use]
    pub fn from_scalars(scalars: Item) -> Self {
        Self {
            scalars,
            relations: BTreeMap::new(),
        }
    }

    /// Add a relation write, merging with any already present for `field`.
    pub fn relate(&mut self, field: impl Into<String>, write: RelationWrite) {
        self.relations.entry(field.into()).or_default().merge(write);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.relations.values().all(RelationWrite::is_empty)
    }
}
