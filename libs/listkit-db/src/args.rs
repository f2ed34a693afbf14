use std::collections::BTreeMap;

use listkit_security::Filter;

/// Relations to join eagerly, keyed by relation field name. Nested entries
/// join further relations on the joined items.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Include {
    relations: BTreeMap<String, Include>,
}

impl Include {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `field` without nested includes.
    #[must_use]
    pub fn relation(self, field: impl Into<String>) -> Self {
        self.nested(field, Include::new())
    }

    /// Join `field` and, on the joined items, everything in `include`.
    #[must_use]
    pub fn nested(mut self, field: impl Into<String>, include: Include) -> Self {
        self.relations.insert(field.into(), include);
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Include> {
        self.relations.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Include)> {
        self.relations.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

impl OrderBy {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Arguments of `find_many`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindManyArgs {
    pub where_: Option<Filter>,
    pub take: Option<u64>,
    pub skip: Option<u64>,
    pub order_by: Vec<OrderBy>,
    pub include: Option<Include>,
}

impl FindManyArgs {
    #[must_use]
    pub fn filtered(filter: Filter) -> Self {
        Self {
            where_: Some(filter),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    #[must_use]
    pub fn include(mut self, include: Include) -> Self {
        self.include = Some(include);
        self
    }
}

/// Arguments of `count`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountArgs {
    pub where_: Option<Filter>,
}

impl CountArgs {
    #[must_use]
    pub fn filtered(filter: Filter) -> Self {
        Self {
            where_: Some(filter),
        }
    }
}
