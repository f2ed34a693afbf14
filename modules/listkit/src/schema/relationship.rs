//! Relationship topology: where each relationship's link is stored.
//!
//! | Shape | Storage |
//! |-------|---------|
//! | single ↔ many | `<singleField>Id` on the single side |
//! | single ↔ single | `<ownerField>Id` on the owning side |
//! | single, one-sided | `<field>Id` on the declaring side |
//! | many ↔ many | join table `_<A>To<B>` (A ≤ B) |
//! | many, one-sided | join table `_<List>_<field>` |
//!
//! The owner of a one-to-one pair is the side marked `foreign_key()`, else
//! the list whose name sorts first, else (self-referential) the field whose
//! name sorts first.

use std::collections::HashMap;

use listkit_db::{JoinSide, RelationStorage, RelationTopology};

use crate::error::ConfigError;
use crate::schema::field::{FieldDescriptor, FieldKind, parse_ref};

/// Built fields of one list, in declaration order.
pub type ListFields<'a> = (&'a str, &'a [FieldDescriptor]);

/// Resolve the storage of every relationship in `lists`.
///
/// # Errors
///
/// A [`ConfigError`] for malformed or dangling refs, refs that do not point
/// back, conflicting `foreign_key()` declarations and clashing join tables.
pub fn resolve(
    lists: &[ListFields<'_>],
) -> Result<HashMap<String, Vec<RelationTopology>>, ConfigError> {
    let by_name: HashMap<&str, &[FieldDescriptor]> = lists.iter().copied().collect();
    let mut out: HashMap<String, Vec<RelationTopology>> = HashMap::new();
    let mut join_tables: HashMap<String, (String, String)> = HashMap::new();

    for &(list, fields) in lists {
        let relations = out.entry(list.to_owned()).or_default();
        for field in fields.iter().filter(|f| f.is_relationship()) {
            let end = End::resolve(list, field, &by_name)?;
            let storage = end.storage()?;
            check_column(list, field, fields, &storage)?;

            if let RelationStorage::JoinTable { table, .. } = &storage {
                let pair = end.pair_key();
                match join_tables.get(table) {
                    Some(existing) if *existing != pair => {
                        return Err(ConfigError::AmbiguousJoinTable {
                            table: table.clone(),
                            first: existing.0.clone(),
                            second: pair.0,
                        });
                    }
                    Some(_) => {}
                    None => {
                        join_tables.insert(table.clone(), pair);
                    }
                }
            }

            relations.push(RelationTopology {
                field: field.name().to_owned(),
                target_list: end.target.to_owned(),
                many: field.is_many(),
                storage,
            });
        }
    }
    Ok(out)
}

/// One side of a relationship, with its counterpart if two-sided.
struct End<'a> {
    list: &'a str,
    field: &'a FieldDescriptor,
    target: &'a str,
    back: Option<&'a FieldDescriptor>,
}

impl<'a> End<'a> {
    fn resolve(
        list: &'a str,
        field: &'a FieldDescriptor,
        lists: &HashMap<&'a str, &'a [FieldDescriptor]>,
    ) -> Result<Self, ConfigError> {
        let FieldKind::Relationship { reference, .. } = field.kind() else {
            return Err(invalid(list, field, "not a relationship"));
        };
        let (target, target_field) =
            parse_ref(reference).ok_or_else(|| ConfigError::MalformedRef {
                list: list.to_owned(),
                field: field.name().to_owned(),
                reference: reference.clone(),
            })?;
        let (target, target_fields) = lists
            .get_key_value(target)
            .map(|(k, v)| (*k, *v))
            .ok_or_else(|| ConfigError::UnknownRefList {
                list: list.to_owned(),
                field: field.name().to_owned(),
                target: target.to_owned(),
            })?;

        if field.is_many() && field.is_foreign_key() {
            return Err(invalid(list, field, "foreign_key applies to single relationships only"));
        }

        let Some(target_field) = target_field else {
            return Ok(Self {
                list,
                field,
                target,
                back: None,
            });
        };
        let back = target_fields
            .iter()
            .find(|f| f.name() == target_field)
            .ok_or_else(|| ConfigError::UnknownRefField {
                list: list.to_owned(),
                field: field.name().to_owned(),
                target: target.to_owned(),
                target_field: target_field.to_owned(),
            })?;
        let mismatch = || ConfigError::RefMismatch {
            list: list.to_owned(),
            field: field.name().to_owned(),
            target: target.to_owned(),
            target_field: target_field.to_owned(),
        };
        match back.relationship_target() {
            None => Err(ConfigError::RefNotRelationship {
                list: list.to_owned(),
                field: field.name().to_owned(),
                target: target.to_owned(),
                target_field: target_field.to_owned(),
            }),
            Some((l, Some(f))) if l == list && f == field.name() => Ok(Self {
                list,
                field,
                target,
                back: Some(back),
            }),
            Some(_) => Err(mismatch()),
        }
    }

    fn storage(&self) -> Result<RelationStorage, ConfigError> {
        let field = self.field;
        let Some(back) = self.back else {
            return Ok(if field.is_many() {
                RelationStorage::JoinTable {
                    table: format!("_{}_{}", self.list, field.name()),
                    side: JoinSide::A,
                }
            } else {
                RelationStorage::LocalKey {
                    column: fk_column(field.name()),
                }
            });
        };

        Ok(match (field.is_many(), back.is_many()) {
            (false, true) => RelationStorage::LocalKey {
                column: fk_column(field.name()),
            },
            (true, false) => RelationStorage::RemoteKey {
                column: fk_column(back.name()),
            },
            (false, false) => {
                if self.owns_key(back)? {
                    RelationStorage::LocalKey {
                        column: fk_column(field.name()),
                    }
                } else {
                    RelationStorage::RemoteKey {
                        column: fk_column(back.name()),
                    }
                }
            }
            (true, true) => {
                let (a, b) = if self.list <= self.target {
                    (self.list, self.target)
                } else {
                    (self.target, self.list)
                };
                let first = if self.list == self.target {
                    field.name() <= back.name()
                } else {
                    self.list < self.target
                };
                RelationStorage::JoinTable {
                    table: format!("_{a}To{b}"),
                    side: if first { JoinSide::A } else { JoinSide::B },
                }
            }
        })
    }

    /// Whether this side of a one-to-one pair stores the foreign key.
    fn owns_key(&self, back: &FieldDescriptor) -> Result<bool, ConfigError> {
        match (self.field.is_foreign_key(), back.is_foreign_key()) {
            (true, true) => {
                let (first, second) = ordered(
                    format!("{}.{}", self.list, self.field.name()),
                    format!("{}.{}", self.target, back.name()),
                );
                Err(ConfigError::ConflictingForeignKey { first, second })
            }
            (true, false) => Ok(true),
            (false, true) => Ok(false),
            (false, false) if self.list != self.target => Ok(self.list < self.target),
            (false, false) => Ok(self.field.name() <= back.name()),
        }
    }

    /// Identity of the relationship, the same from both ends.
    fn pair_key(&self) -> (String, String) {
        let here = format!("{}.{}", self.list, self.field.name());
        match self.back {
            Some(back) => ordered(here, format!("{}.{}", self.target, back.name())),
            None => (here, String::new()),
        }
    }
}

fn ordered(a: String, b: String) -> (String, String) {
    if a <= b { (a, b) } else { (b, a) }
}

fn fk_column(field: &str) -> String {
    format!("{field}Id")
}

/// A local foreign-key column must not collide with a declared field.
fn check_column(
    list: &str,
    field: &FieldDescriptor,
    fields: &[FieldDescriptor],
    storage: &RelationStorage,
) -> Result<(), ConfigError> {
    if let RelationStorage::LocalKey { column } = storage
        && fields.iter().any(|f| f.name() == column)
    {
        return Err(invalid(
            list,
            field,
            &format!("foreign key column '{column}' collides with a declared field"),
        ));
    }
    Ok(())
}

fn invalid(list: &str, field: &FieldDescriptor, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        list: list.to_owned(),
        field: field.name().to_owned(),
        reason: reason.to_owned(),
    }
}
