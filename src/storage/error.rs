use thiserror::Error;

use crate::domain::hash::TrackId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("track {0} not found")]
    TrackNotFound(TrackId),

    #[error("device profile '{0}' not found")]
    DeviceNotFound(String),

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
