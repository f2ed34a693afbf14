use std::sync::Arc;

use async_trait::async_trait;
use listkit_security::Filter;

use crate::args::{FindManyArgs, Include};
use crate::error::PersistenceError;
use crate::write::{Item, WriteData};

/// Model-per-list persistence client.
///
/// `where_ = None` means "no restriction". Unique selectors passed to
/// `find_unique`, `update` and `delete` are ordinary filters; engines must
/// affect at most one row.
#[async_trait]
pub trait ListClient: Send + Sync {
    async fn find_first(
        &self,
        where_: Option<&Filter>,
        include: Option<&Include>,
    ) -> Result<Option<Item>, PersistenceError>;

    async fn find_many(&self, args: &FindManyArgs) -> Result<Vec<Item>, PersistenceError>;

    async fn find_unique(
        &self,
        where_: &Filter,
        include: Option<&Include>,
    ) -> Result<Option<Item>, PersistenceError>;

    async fn create(&self, data: WriteData) -> Result<Item, PersistenceError>;

    /// # Errors
    ///
    /// [`PersistenceError::RecordNotFound`] if no row matches `where_`.
    async fn update(&self, where_: &Filter, data: WriteData) -> Result<Item, PersistenceError>;

    /// # Errors
    ///
    /// [`PersistenceError::RecordNotFound`] if no row matches `where_`.
    async fn delete(&self, where_: &Filter) -> Result<Item, PersistenceError>;

    async fn count(&self, where_: Option<&Filter>) -> Result<u64, PersistenceError>;
}

/// Hands out one [`ListClient`] per list.
pub trait Database: Send + Sync {
    /// # Errors
    ///
    /// [`PersistenceError::UnknownList`] if the engine has no such list.
    fn list(&self, list: &str) -> Result<Arc<dyn ListClient>, PersistenceError>;
}
