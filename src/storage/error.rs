//! Error types for history storage

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while loading or saving history
#[derive(Debug, Error)]
pub enum StorageError {
    /// The persisted file exists but cannot be used (empty, malformed, ...)
    #[error("persisted state at {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// I/O error (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Moving the freshly written file over the previous one failed
    #[error("failed to replace {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StorageError::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, StorageError::Corrupt { .. })
    }
}
