use common::storage::StorageError;
use sea_orm::DbErr;
use thiserror::Error;

/// Failure of a catalog operation.
///
/// Uploads and deletes that return any of these left the catalog and blob
/// store exactly as they found them.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input, rejected before the catalog is touched.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Hash creation kept racing with concurrent uploads; the whole upload may
    /// be retried.
    #[error("{0}")]
    Conflict(String),

    /// Physical write or unlink failed.
    #[error("storage failure: {0}")]
    StorageIo(String),

    /// Catalog and blob store disagree in a way correct operation never
    /// produces.
    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl ServiceError {
    /// Short machine-readable kind, used in bulk results and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::StorageIo(_) => "STORAGE_ERROR",
            Self::Consistency(_) => "CONSISTENCY_ERROR",
            Self::Database(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SizeLimitExceeded { actual, limit } => ServiceError::Validation(format!(
                "File exceeds maximum size of {limit} bytes ({actual} bytes received)"
            )),
            StorageError::InvalidHash(msg) => ServiceError::Validation(msg),
            StorageError::NotFound(hash) => {
                ServiceError::Consistency(format!("bytes for {hash} are missing from storage"))
            }
            other => ServiceError::StorageIo(other.to_string()),
        }
    }
}
