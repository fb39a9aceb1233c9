//! Error types for the cache and the cached translation path.

use std::path::PathBuf;

use thiserror::Error;

/// Low-level storage failure shared by every store operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache store is closed")]
    Closed,

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// The store could not be opened. Callers continue without caching.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open cache database: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to start reclamation task: {0}")]
    Reclaimer(#[source] std::io::Error),
}

impl From<rusqlite::Error> for OpenError {
    fn from(e: rusqlite::Error) -> Self {
        OpenError::Storage(StorageError::Sqlite(e))
    }
}

impl From<r2d2::Error> for OpenError {
    fn from(e: r2d2::Error) -> Self {
        OpenError::Storage(StorageError::Pool(e))
    }
}

/// A cache write failed. Best-effort: logged, never shown to the user.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for WriteError {
    fn from(e: rusqlite::Error) -> Self {
        WriteError::Storage(StorageError::Sqlite(e))
    }
}

impl From<r2d2::Error> for WriteError {
    fn from(e: r2d2::Error) -> Self {
        WriteError::Storage(StorageError::Pool(e))
    }
}

/// Failure reported by a [`Translator`](crate::translate::Translator) backend.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("API error: {0}")]
    Api(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("translation timeout")]
    Timeout,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
