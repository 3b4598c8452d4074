//! Pluggable document storage for conversation logs
//!
//! A backend stores one opaque document per key and always replaces it
//! wholesale on write.

mod file;
mod object;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use object::ObjectStore;
pub use sqlite::SqliteStore;

/// Errors from a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object storage returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid object storage endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Keys name a single document; anything that could address another location is refused
pub(crate) fn check_key(key: &str) -> Result<&str, StorageError> {
    if key.is_empty()
        || key.contains("..")
        || key.contains(|c: char| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control())
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(key)
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the document at `key`, `None` when nothing has been stored yet
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Overwrite the document at `key`
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
