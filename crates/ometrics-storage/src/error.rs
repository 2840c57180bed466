use ometrics_common::error::MetricError;
use ometrics_common::types::MetricKind;
use rusqlite::ErrorCode;
use std::path::PathBuf;

/// Errors that can occur within the storage layer.
///
/// Only [`StorageError::ResourceBusy`] is transient; callers may retry it.
///
/// # Examples
///
/// ```rust
/// use ometrics_common::error::MetricError;
/// use ometrics_common::types::MetricKind;
/// use ometrics_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     kind: MetricKind::Gauge,
///     name: "Alloc".to_string(),
/// };
/// assert!(err.to_string().contains("Alloc"));
/// assert!(err.is_not_found());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The metric was never written.
    #[error("Storage: {kind} '{name}' not found")]
    NotFound { kind: MetricKind, name: String },

    /// The value cannot be stored (a non-finite gauge).
    #[error("Storage: {0}")]
    InvalidValue(#[from] MetricError),

    /// The backend is temporarily contended (SQLite busy or locked).
    #[error("Storage: resource busy: {0}")]
    ResourceBusy(String),

    /// Reading or writing the snapshot file failed.
    #[error("Storage: persistence failed for '{}': {source}", path.display())]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The snapshot file could not be encoded or decoded.
    #[error("Storage: snapshot format error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    /// Some entries of a batch update failed; the others were applied.
    #[error("Storage: {} batch update(s) failed, first: {}", .0.len(), first_message(.0))]
    Batch(Vec<StorageError>),
}

fn first_message(errors: &[StorageError]) -> String {
    errors.first().map(ToString::to_string).unwrap_or_default()
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => true,
            StorageError::Batch(errors) => errors.iter().any(StorageError::is_not_found),
            _ => false,
        }
    }

    pub fn is_invalid(&self) -> bool {
        match self {
            StorageError::InvalidValue(_) => true,
            StorageError::Batch(errors) => errors.iter().any(StorageError::is_invalid),
            _ => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        match self {
            StorageError::ResourceBusy(_) => true,
            StorageError::Batch(errors) => errors.iter().any(StorageError::is_busy),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                StorageError::ResourceBusy(e.to_string())
            }
            _ => StorageError::Sqlite(e),
        }
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
