mod error;
mod hash;
mod traits;

pub mod filesystem;

pub use error::StorageError;
pub use filesystem::FilesystemBlobStore;
pub use hash::{ContentHash, ContentHasher};
pub use traits::{BlobStore, BoxReader};
