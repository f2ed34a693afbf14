#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
pub mod access_scope;
pub mod compiler;
pub mod filter;
pub mod session;

pub use access_scope::AccessScope;
pub use compiler::FilterParseError;
pub use filter::{FieldFilter, Filter, FilterOp, system_fields};
pub use session::Session;
