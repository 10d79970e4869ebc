use std::fmt;

/// Failures raised by a [`BlobStore`](super::BlobStore) implementation.
#[derive(Debug)]
pub enum StorageError {
    /// No bytes are stored under the given hash.
    NotFound(String),
    /// Underlying filesystem failure.
    Io(std::io::Error),
    /// A hash string could not be parsed.
    InvalidHash(String),
    /// The content is larger than the store accepts.
    SizeLimitExceeded { actual: u64, limit: u64 },
    /// The bytes written did not hash to the digest the caller expected.
    DigestMismatch { expected: String, actual: String },
}

impl StorageError {
    /// True for failures caused by the caller's input rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidHash(_) | Self::SizeLimitExceeded { .. }
        )
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(hash) => write!(f, "no stored content for {hash}"),
            Self::Io(err) => write!(f, "blob store I/O failure: {err}"),
            Self::InvalidHash(msg) => write!(f, "malformed content hash: {msg}"),
            Self::SizeLimitExceeded { actual, limit } => {
                write!(f, "content is {actual} bytes, limit is {limit} bytes")
            }
            Self::DigestMismatch { expected, actual } => {
                write!(f, "stored digest {actual} does not match expected {expected}")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
