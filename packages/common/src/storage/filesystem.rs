use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use super::error::StorageError;
use super::hash::{ContentHash, ContentHasher};
use super::traits::{BlobStore, BoxReader};

const TEMP_DIR: &str = ".tmp";
const READ_BUF: usize = 64 * 1024;

/// Content-addressed blob store on a local filesystem.
///
/// Layout is Git-style sharding, `{root}/{2 hex}/{62 hex}`. Writes land in
/// `{root}/.tmp` first and are renamed into place, so a blob path only ever
/// holds complete content.
pub struct FilesystemBlobStore {
    root: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Leftover temp files from an interrupted write are removed.
    pub async fn new(root: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(root.join(TEMP_DIR)).await?;
        let store = Self { root, max_size };
        let purged = store.purge_temp().await?;
        if purged > 0 {
            warn!(purged, root = %store.root.display(), "Removed stale partial writes");
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.shard_prefix()).join(hash.shard_suffix())
    }

    fn temp_path(&self) -> PathBuf {
        self.root
            .join(TEMP_DIR)
            .join(uuid::Uuid::new_v4().to_string())
    }

    async fn purge_temp(&self) -> Result<usize, StorageError> {
        let mut entries = fs::read_dir(self.root.join(TEMP_DIR)).await?;
        let mut purged = 0;
        while let Some(entry) = entries.next_entry().await? {
            if fs::remove_file(entry.path()).await.is_ok() {
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Copy `reader` into a fresh temp file, returning its digest and length.
    async fn spill(
        &self,
        reader: &mut BoxReader,
        temp_path: &Path,
    ) -> Result<(ContentHash, u64), StorageError> {
        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; READ_BUF];
        let mut temp_file = fs::File::create(temp_path).await?;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            if hasher.len() + n as u64 > self.max_size {
                return Err(StorageError::SizeLimitExceeded {
                    actual: hasher.len() + n as u64,
                    limit: self.max_size,
                });
            }
            hasher.update(&buf[..n]);
            temp_file.write_all(&buf[..n]).await?;
        }

        temp_file.flush().await?;
        temp_file.sync_all().await?;
        Ok(hasher.finish())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put_stream(&self, mut reader: BoxReader) -> Result<ContentHash, StorageError> {
        let temp_path = self.temp_path();

        let hash = match self.spill(&mut reader, &temp_path).await {
            Ok((hash, _)) => hash,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        let blob_path = self.blob_path(&hash);
        if fs::try_exists(&blob_path).await? {
            let _ = fs::remove_file(&temp_path).await;
            debug!(%hash, "Blob already present, write skipped");
            return Ok(hash);
        }

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &blob_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(hash)
    }

    async fn get_stream(&self, hash: &ContentHash) -> Result<BoxReader, StorageError> {
        match fs::File::open(self.blob_path(hash)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(hash.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.blob_path(hash)).await?)
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        match fs::remove_file(self.blob_path(hash)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, hash: &ContentHash) -> Result<u64, StorageError> {
        match fs::metadata(self.blob_path(hash)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(hash.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<ContentHash>, StorageError> {
        let mut hashes = Vec::new();
        let mut shards = fs::read_dir(&self.root).await?;

        while let Some(shard) = shards.next_entry().await? {
            let prefix = shard.file_name();
            let Some(prefix) = prefix.to_str() else {
                continue;
            };
            if prefix.len() != 2 || !shard.file_type().await?.is_dir() {
                continue;
            }

            let mut files = fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let name = file.file_name();
                let Some(suffix) = name.to_str() else {
                    continue;
                };
                match ContentHash::from_hex(&format!("{prefix}{suffix}")) {
                    Ok(hash) => hashes.push(hash),
                    Err(_) => debug!(path = %file.path().display(), "Ignoring foreign file"),
                }
            }
        }

        hashes.sort();
        Ok(hashes)
    }
}
