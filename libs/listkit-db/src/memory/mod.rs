//! In-process persistence engine.
//!
//! Rows are JSON objects kept per list; join tables are `(a, b)` id pairs.
//! Every call is journaled (see [`MemoryDatabase::calls`]).

mod eval;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use listkit_security::{Filter, system_fields};
use parking_lot::RwLock;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::args::{FindManyArgs, Include};
use crate::client::{Database, ListClient};
use crate::error::PersistenceError;
use crate::topology::{JoinSide, ListTopology, RelationStorage, RelationTopology};
use crate::write::{Item, RelationWrite, WriteData};

const FOREIGN_KEY_CODE: &str = "P2003";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    FindFirst,
    FindMany,
    FindUnique,
    Create,
    Update,
    Delete,
    Count,
}

/// One journaled persistence call.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub list: String,
    pub kind: CallKind,
    pub where_: Option<Filter>,
    pub data: Option<WriteData>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Item>>,
    joins: HashMap<String, Vec<(Value, Value)>>,
    calls: Vec<RecordedCall>,
}

struct Inner {
    topology: HashMap<String, ListTopology>,
    state: RwLock<State>,
}

/// In-memory [`Database`].
#[derive(Clone)]
pub struct MemoryDatabase {
    inner: Arc<Inner>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new(topology: Vec<ListTopology>) -> Self {
        let mut state = State::default();
        for list in &topology {
            state.tables.insert(list.name.clone(), Vec::new());
        }
        Self {
            inner: Arc::new(Inner {
                topology: topology.into_iter().map(|t| (t.name.clone(), t)).collect(),
                state: RwLock::new(state),
            }),
        }
    }

    /// Insert a row directly, bypassing the journal and constraints.
    /// Assigns an `id` if the row has none and returns the stored row.
    pub fn seed(&self, list: &str, mut row: Item) -> Item {
        row.entry(system_fields::ID)
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        let mut state = self.inner.state.write();
        state
            .tables
            .entry(list.to_owned())
            .or_default()
            .push(row.clone());
        row
    }

    /// Snapshot of every row of `list`.
    #[must_use]
    pub fn rows(&self, list: &str) -> Vec<Item> {
        self.inner
            .state
            .read()
            .tables
            .get(list)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the `(a, b)` pairs of a join table.
    #[must_use]
    pub fn join_pairs(&self, table: &str) -> Vec<(Value, Value)> {
        self.inner
            .state
            .read()
            .joins
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.state.read().calls.clone()
    }

    /// Journaled calls against `list` of the given kind.
    #[must_use]
    pub fn calls_of(&self, list: &str, kind: CallKind) -> Vec<RecordedCall> {
        self.inner
            .state
            .read()
            .calls
            .iter()
            .filter(|c| c.list == list && c.kind == kind)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.state.write().calls.clear();
    }
}

impl Database for MemoryDatabase {
    fn list(&self, list: &str) -> Result<Arc<dyn ListClient>, PersistenceError> {
        if !self.inner.topology.contains_key(list) {
            return Err(PersistenceError::UnknownList {
                list: list.to_owned(),
            });
        }
        Ok(Arc::new(MemoryListClient {
            inner: Arc::clone(&self.inner),
            list: list.to_owned(),
        }))
    }
}

struct MemoryListClient {
    inner: Arc<Inner>,
    list: String,
}

impl MemoryListClient {
    fn record(&self, state: &mut State, kind: CallKind, where_: Option<&Filter>, data: Option<&WriteData>) {
        state.calls.push(RecordedCall {
            list: self.list.clone(),
            kind,
            where_: where_.cloned(),
            data: data.cloned(),
        });
    }

    fn topology(&self) -> Result<&ListTopology, PersistenceError> {
        self.inner
            .topology
            .get(&self.list)
            .ok_or_else(|| PersistenceError::UnknownList {
                list: self.list.clone(),
            })
    }

    fn not_found(&self) -> PersistenceError {
        PersistenceError::RecordNotFound {
            list: self.list.clone(),
        }
    }
}

#[async_trait]
impl ListClient for MemoryListClient {
    async fn find_first(
        &self,
        where_: Option<&Filter>,
        include: Option<&Include>,
    ) -> Result<Option<Item>, PersistenceError> {
        let mut state = self.inner.state.write();
        self.record(&mut state, CallKind::FindFirst, where_, None);
        let found = select(&state, &self.list, where_).into_iter().next();
        Ok(found.map(|row| self.inner.join(&state, &self.list, row, include)))
    }

    async fn find_many(&self, args: &FindManyArgs) -> Result<Vec<Item>, PersistenceError> {
        let mut state = self.inner.state.write();
        self.record(&mut state, CallKind::FindMany, args.where_.as_ref(), None);
        let mut rows = select(&state, &self.list, args.where_.as_ref());
        eval::sort(&mut rows, &args.order_by);
        let skip = args.skip.map_or(0, |s| usize::try_from(s).unwrap_or(usize::MAX));
        let take = args.take.map_or(usize::MAX, |t| usize::try_from(t).unwrap_or(usize::MAX));
        Ok(rows
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|row| self.inner.join(&state, &self.list, row, args.include.as_ref()))
            .collect())
    }

    async fn find_unique(
        &self,
        where_: &Filter,
        include: Option<&Include>,
    ) -> Result<Option<Item>, PersistenceError> {
        let mut state = self.inner.state.write();
        self.record(&mut state, CallKind::FindUnique, Some(where_), None);
        let found = select(&state, &self.list, Some(where_)).into_iter().next();
        Ok(found.map(|row| self.inner.join(&state, &self.list, row, include)))
    }

    async fn create(&self, data: WriteData) -> Result<Item, PersistenceError> {
        let mut state = self.inner.state.write();
        self.record(&mut state, CallKind::Create, None, Some(&data));
        let topology = self.topology()?;
        check_targets(&state, topology, &data)?;

        let now = now();
        let mut row = data.scalars.clone();
        row.entry(system_fields::ID)
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        row.insert(system_fields::CREATED_AT.to_owned(), now.clone());
        row.insert(system_fields::UPDATED_AT.to_owned(), now);
        apply_local_keys(topology, &mut row, &data);
        check_unique(&state, topology, &row, None)?;

        let id = row.get(system_fields::ID).cloned().unwrap_or(Value::Null);
        state
            .tables
            .entry(self.list.clone())
            .or_default()
            .push(row.clone());
        apply_remote(&mut state, topology, &id, &data);
        tracing::debug!(list = %self.list, "memory: row created");
        Ok(row)
    }

    async fn update(&self, where_: &Filter, data: WriteData) -> Result<Item, PersistenceError> {
        let mut state = self.inner.state.write();
        self.record(&mut state, CallKind::Update, Some(where_), Some(&data));
        let topology = self.topology()?;
        let index = position(&state, &self.list, where_).ok_or_else(|| self.not_found())?;
        check_targets(&state, topology, &data)?;

        let mut row = state.tables[&self.list][index].clone();
        for (k, v) in &data.scalars {
            row.insert(k.clone(), v.clone());
        }
        row.insert(system_fields::UPDATED_AT.to_owned(), now());
        apply_local_keys(topology, &mut row, &data);
        check_unique(&state, topology, &row, Some(index))?;

        let id = row.get(system_fields::ID).cloned().unwrap_or(Value::Null);
        if let Some(rows) = state.tables.get_mut(&self.list) {
            rows[index] = row.clone();
        }
        apply_remote(&mut state, topology, &id, &data);
        tracing::debug!(list = %self.list, "memory: row updated");
        Ok(row)
    }

    async fn delete(&self, where_: &Filter) -> Result<Item, PersistenceError> {
        let mut state = self.inner.state.write();
        self.record(&mut state, CallKind::Delete, Some(where_), None);
        let index = position(&state, &self.list, where_).ok_or_else(|| self.not_found())?;
        let row = match state.tables.get_mut(&self.list) {
            Some(rows) => rows.remove(index),
            None => return Err(self.not_found()),
        };
        let id = row.get(system_fields::ID).cloned().unwrap_or(Value::Null);
        self.inner.release_links(&mut state, &self.list, &id);
        tracing::debug!(list = %self.list, "memory: row deleted");
        Ok(row)
    }

    async fn count(&self, where_: Option<&Filter>) -> Result<u64, PersistenceError> {
        let mut state = self.inner.state.write();
        self.record(&mut state, CallKind::Count, where_, None);
        let n = select(&state, &self.list, where_).len();
        Ok(u64::try_from(n).unwrap_or(u64::MAX))
    }
}

impl Inner {
    /// Attach included relations to `row`, recursively.
    fn join(&self, state: &State, list: &str, mut row: Item, include: Option<&Include>) -> Item {
        let (Some(include), Some(topology)) = (include, self.topology.get(list)) else {
            return row;
        };
        for (field, nested) in include.iter() {
            let Some(rel) = topology.relation(field) else {
                continue;
            };
            let related: Vec<Item> = related_rows(state, rel, &row)
                .into_iter()
                .map(|r| self.join(state, &rel.target_list, r, Some(nested)))
                .collect();
            let value = if rel.many {
                Value::Array(related.into_iter().map(Value::Object).collect())
            } else {
                related.into_iter().next().map_or(Value::Null, Value::Object)
            };
            row.insert(field.to_owned(), value);
        }
        row
    }

    /// Drop join pairs and null out foreign keys that point at a deleted row.
    fn release_links(&self, state: &mut State, list: &str, id: &Value) {
        for topology in self.topology.values() {
            for rel in &topology.relations {
                match &rel.storage {
                    RelationStorage::LocalKey { column } if rel.target_list == list => {
                        if let Some(rows) = state.tables.get_mut(&topology.name) {
                            for row in rows.iter_mut().filter(|r| r.get(column) == Some(id)) {
                                row.insert(column.clone(), Value::Null);
                            }
                        }
                    }
                    RelationStorage::JoinTable { table, side } => {
                        if let Some(pairs) = state.joins.get_mut(table) {
                            if topology.name == list {
                                pairs.retain(|pair| pick(pair, *side) != id);
                            }
                            if rel.target_list == list {
                                pairs.retain(|pair| pick(pair, side.other()) != id);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Every id named in a `connect` must exist in the target list.
fn check_targets(
    state: &State,
    topology: &ListTopology,
    data: &WriteData,
) -> Result<(), PersistenceError> {
    for (field, write) in &data.relations {
        let Some(rel) = topology.relation(field) else {
            return Err(PersistenceError::Provider {
                code: FOREIGN_KEY_CODE.to_owned(),
                message: format!("unknown relation '{field}' on '{}'", topology.name),
            });
        };
        for id in &write.connect {
            if find_by_id(state, &rel.target_list, id).is_none() {
                return Err(PersistenceError::Provider {
                    code: FOREIGN_KEY_CODE.to_owned(),
                    message: format!(
                        "foreign key constraint failed on '{}.{field}'",
                        topology.name
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Apply relation writes whose link lives outside the row itself.
fn apply_remote(state: &mut State, topology: &ListTopology, id: &Value, data: &WriteData) {
    for (field, write) in &data.relations {
        let Some(rel) = topology.relation(field) else {
            continue;
        };
        match &rel.storage {
            RelationStorage::LocalKey { .. } => {}
            RelationStorage::RemoteKey { column } => {
                apply_remote_key(state, rel, column, id, write);
            }
            RelationStorage::JoinTable { table, side } => {
                apply_join(state, table, *side, id, write);
            }
        }
    }
}

fn now() -> Value {
    Value::String(
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
    )
}

fn select(state: &State, list: &str, where_: Option<&Filter>) -> Vec<Item> {
    state
        .tables
        .get(list)
        .map(|rows| {
            rows.iter()
                .filter(|row| where_.is_none_or(|f| eval::matches(f, row)))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn position(state: &State, list: &str, where_: &Filter) -> Option<usize> {
    state
        .tables
        .get(list)?
        .iter()
        .position(|row| eval::matches(where_, row))
}

fn find_by_id<'a>(state: &'a State, list: &str, id: &Value) -> Option<&'a Item> {
    state
        .tables
        .get(list)?
        .iter()
        .find(|row| row.get(system_fields::ID).is_some_and(|v| eval::loose_eq(v, id)))
}

fn pick(pair: &(Value, Value), side: JoinSide) -> &Value {
    match side {
        JoinSide::A => &pair.0,
        JoinSide::B => &pair.1,
    }
}

fn related_rows(state: &State, rel: &RelationTopology, row: &Item) -> Vec<Item> {
    let id = row.get(system_fields::ID).unwrap_or(&Value::Null);
    match &rel.storage {
        RelationStorage::LocalKey { column } => match row.get(column) {
            Some(fk) if !fk.is_null() => find_by_id(state, &rel.target_list, fk)
                .cloned()
                .into_iter()
                .collect(),
            _ => Vec::new(),
        },
        RelationStorage::RemoteKey { column } => {
            select(state, &rel.target_list, Some(&Filter::eq(column.clone(), id.clone())))
        }
        RelationStorage::JoinTable { table, side } => state
            .joins
            .get(table)
            .map(|pairs| {
                pairs
                    .iter()
                    .filter(|pair| pick(pair, *side) == id)
                    .filter_map(|pair| find_by_id(state, &rel.target_list, pick(pair, side.other())))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Set or clear foreign keys stored on the row being written.
fn apply_local_keys(topology: &ListTopology, row: &mut Item, data: &WriteData) {
    for (field, write) in &data.relations {
        let Some(RelationStorage::LocalKey { column }) = topology.relation(field).map(|r| &r.storage)
        else {
            continue;
        };
        if write.disconnect_all || write.disconnect.iter().any(|id| row.get(column) == Some(id)) {
            row.insert(column.clone(), Value::Null);
        }
        if let Some(id) = write.connect.last() {
            row.insert(column.clone(), id.clone());
        }
    }
}

fn apply_remote_key(
    state: &mut State,
    rel: &RelationTopology,
    column: &str,
    id: &Value,
    write: &RelationWrite,
) {
    let Some(rows) = state.tables.get_mut(&rel.target_list) else {
        return;
    };
    let clear_existing = write.disconnect_all || (!rel.many && !write.connect.is_empty());
    for row in rows.iter_mut() {
        if row.get(column) != Some(id) {
            continue;
        }
        let row_id = row.get(system_fields::ID).cloned().unwrap_or(Value::Null);
        if clear_existing || write.disconnect.contains(&row_id) {
            row.insert(column.to_owned(), Value::Null);
        }
    }
    for target in &write.connect {
        if let Some(row) = rows
            .iter_mut()
            .find(|r| r.get(system_fields::ID).is_some_and(|v| eval::loose_eq(v, target)))
        {
            row.insert(column.to_owned(), id.clone());
        }
    }
}

fn apply_join(state: &mut State, table: &str, side: JoinSide, id: &Value, write: &RelationWrite) {
    let pairs = state.joins.entry(table.to_owned()).or_default();
    if write.disconnect_all {
        pairs.retain(|pair| pick(pair, side) != id);
    }
    pairs.retain(|pair| !(pick(pair, side) == id && write.disconnect.contains(pick(pair, side.other()))));
    for target in &write.connect {
        let pair = match side {
            JoinSide::A => (id.clone(), target.clone()),
            JoinSide::B => (target.clone(), id.clone()),
        };
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }
}

fn check_unique(
    state: &State,
    topology: &ListTopology,
    row: &Item,
    skip: Option<usize>,
) -> Result<(), PersistenceError> {
    let Some(rows) = state.tables.get(&topology.name) else {
        return Ok(());
    };
    let unique = std::iter::once(system_fields::ID).chain(topology.unique_fields.iter().map(String::as_str));
    for field in unique {
        let Some(value) = row.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let clash = rows
            .iter()
            .enumerate()
            .any(|(i, other)| Some(i) != skip && other.get(field) == Some(value));
        if clash {
            return Err(PersistenceError::UniqueConstraint {
                fields: vec![field.to_owned()],
            });
        }
    }
    Ok(())
}
