//! The access-controlled operation pipeline.

pub mod access;
pub mod hooks;
pub mod nested;
pub mod output;
pub mod pipeline;
pub mod validation;

#[cfg(test)]
mod tests_hook_order;
#[cfg(test)]
mod tests_output;
#[cfg(test)]
mod tests_pipeline;

use std::fmt;

/// The kind of operation flowing through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Query,
    Create,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relationship sub-operation inside a write payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedOperation {
    Connect,
    Create,
    Update,
    Disconnect,
}

impl NestedOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Create => "create",
            Self::Update => "update",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for NestedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-level access checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperation {
    Read,
    Create,
    Update,
}
