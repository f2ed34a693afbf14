//! Relation storage layout, as decided when the schema is built.
//!
//! This is plain data so that a persistence engine can honour the layout
//! without depending on the schema crate.

/// Which column of a join table holds this list's ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinSide {
    A,
    B,
}

impl JoinSide {
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Where the link for a relation field lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationStorage {
    /// Foreign key `column` on this list's rows.
    LocalKey { column: String },
    /// Foreign key `column` on the target list's rows, pointing back here.
    RemoteKey { column: String },
    /// Rows of join table `table`; this list's ids live in `side`.
    JoinTable { table: String, side: JoinSide },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationTopology {
    pub field: String,
    pub target_list: String,
    pub many: bool,
    pub storage: RelationStorage,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListTopology {
    pub name: String,
    pub relations: Vec<RelationTopology>,
    /// Scalar columns with a uniqueness constraint (besides `id`).
    pub unique_fields: Vec<String>,
}

impl ListTopology {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn relation(&self, field: &str) -> Option<&RelationTopology> {
        self.relations.iter().find(|r| r.field == field)
    }
}
