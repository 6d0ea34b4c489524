use std::path::PathBuf;

use thiserror::Error;

use super::Family;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("Migration from schema version {from} failed: {reason}")]
    MigrationFailed { from: u32, reason: String },

    #[error("No migration registered from schema version {from} to {target}")]
    MissingMigration { from: u32, target: u32 },

    #[error("Stored schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Invalid {family} record: {reason}")]
    InvalidRecord { family: Family, reason: String },

    #[error("{family} record '{id}' already exists and cannot be replaced")]
    DuplicateRecord { family: Family, id: String },

    #[error("{0} records are not writable through put/delete")]
    ProtectedFamily(Family),

    #[error("Unknown content item: {0}")]
    UnknownContentItem(String),

    #[error("Unknown index '{index}' on {family}")]
    UnknownIndex { family: Family, index: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StoreError::StorageUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that mean the persistence medium itself is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::StorageUnavailable { .. }
                | StoreError::MigrationFailed { .. }
                | StoreError::MissingMigration { .. }
                | StoreError::UnsupportedVersion { .. }
        )
    }
}
