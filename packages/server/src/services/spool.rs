use std::path::{Path, PathBuf};

use common::storage::{BoxReader, ContentHash, ContentHasher};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::warn;

use super::ServiceError;

const READ_BUF: usize = 64 * 1024;
const FILE_PREFIX: &str = "upload-";

/// Upload content parked on local disk while its digest decides where it goes.
#[derive(Debug)]
pub struct SpooledUpload {
    path: PathBuf,
    pub hash: ContentHash,
    pub size: u64,
}

impl SpooledUpload {
    /// Drain `reader` into a temp file under `dir`, hashing as it goes.
    ///
    /// Crossing `limit` bytes is a validation error; nothing is left behind on
    /// failure.
    pub async fn write<R>(mut reader: R, dir: &Path, limit: u64) -> Result<Self, ServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| ServiceError::StorageIo(format!("spool directory: {e}")))?;
        let path = dir.join(format!("{FILE_PREFIX}{}", uuid::Uuid::new_v4()));

        match Self::drain(&mut reader, &path, limit).await {
            Ok((hash, size)) => Ok(Self { path, hash, size }),
            Err(e) => {
                let _ = fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    async fn drain<R>(
        reader: &mut R,
        path: &Path,
        limit: u64,
    ) -> Result<(ContentHash, u64), ServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let io_err = |e: std::io::Error| ServiceError::StorageIo(format!("spooling upload: {e}"));

        let mut file = fs::File::create(path).await.map_err(io_err)?;
        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; READ_BUF];

        loop {
            let n = reader.read(&mut buf).await.map_err(|e| {
                ServiceError::Validation(format!("Failed to read upload body: {e}"))
            })?;
            if n == 0 {
                break;
            }
            let received = hasher.len() + n as u64;
            if received > limit {
                return Err(ServiceError::Validation(format!(
                    "File exceeds maximum size of {limit} bytes"
                )));
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await.map_err(io_err)?;
        }

        file.flush().await.map_err(io_err)?;
        Ok(hasher.finish())
    }

    /// Fresh reader over the spooled bytes.
    pub async fn reader(&self) -> Result<BoxReader, ServiceError> {
        let file = fs::File::open(&self.path)
            .await
            .map_err(|e| ServiceError::StorageIo(format!("reopening spooled upload: {e}")))?;
        Ok(Box::new(file))
    }

    /// Delete spool files left by an earlier process. Only call before any
    /// upload is in flight.
    pub async fn purge_stale(dir: &Path) -> Result<usize, ServiceError> {
        let io_err = |e: std::io::Error| ServiceError::StorageIo(format!("purging spool: {e}"));

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_err(e)),
        };
        let mut purged = 0;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let is_spool_file = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(FILE_PREFIX));
            if is_spool_file && fs::remove_file(entry.path()).await.is_ok() {
                purged += 1;
            }
        }
        Ok(purged)
    }

    pub async fn remove(self) {
        if let Err(e) = fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "Failed to remove spooled upload");
        }
    }
}
