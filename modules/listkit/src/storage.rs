//! File/image storage capability handed to hooks through the context.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no storage provider is configured")]
    NotConfigured,

    #[error("stored object '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// An upload as received from the caller.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Metadata of a stored object, suitable for persisting in a field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub key: String,
    pub filename: String,
    pub size: u64,
    pub url: String,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload_file(&self, file: FileUpload) -> Result<StoredFile, StorageError>;

    async fn upload_image(&self, image: FileUpload) -> Result<StoredFile, StorageError>;

    async fn delete_file(&self, key: &str) -> Result<(), StorageError>;

    async fn delete_image(&self, key: &str) -> Result<(), StorageError>;
}

/// The capability used when a stack is built without storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStorage;

#[async_trait]
impl Storage for NoStorage {
    async fn upload_file(&self, _file: FileUpload) -> Result<StoredFile, StorageError> {
        Err(StorageError::NotConfigured)
    }

    async fn upload_image(&self, _image: FileUpload) -> Result<StoredFile, StorageError> {
        Err(StorageError::NotConfigured)
    }

    async fn delete_file(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::NotConfigured)
    }

    async fn delete_image(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::NotConfigured)
    }
}

/// Keeps objects in memory under `files/` and `images/` prefixes.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn put(&self, prefix: &str, upload: FileUpload) -> StoredFile {
        let key = format!("{prefix}/{}-{}", uuid::Uuid::new_v4(), upload.filename);
        let size = u64::try_from(upload.bytes.len()).unwrap_or(u64::MAX);
        self.objects.write().insert(key.clone(), upload.bytes);
        StoredFile {
            url: format!("memory://{key}"),
            key,
            filename: upload.filename,
            size,
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload_file(&self, file: FileUpload) -> Result<StoredFile, StorageError> {
        Ok(self.put("files", file))
    }

    async fn upload_image(&self, image: FileUpload) -> Result<StoredFile, StorageError> {
        Ok(self.put("images", image))
    }

    async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        self.remove(key)
    }

    async fn delete_image(&self, key: &str) -> Result<(), StorageError> {
        self.remove(key)
    }
}
