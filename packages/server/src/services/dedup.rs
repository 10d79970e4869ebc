use std::path::PathBuf;
use std::sync::Arc;

use common::RetryPolicy;
use common::storage::{BlobStore, BoxReader, ContentHash};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, SqlErr, TransactionTrait};
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::ServiceError;
use super::locks::HashLocks;
use super::spool::SpooledUpload;
use crate::catalog::{Catalog, NewReference};
use crate::config::DedupConfig;
use crate::entity::file_reference;
use crate::utils::filename::{resolve_media_type, validate_flat_filename};

/// Metadata accompanying upload content.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub filename: String,
    /// Media type supplied by the client, if any.
    pub declared_type: Option<String>,
    /// Length announced by the client, checked before any bytes are read.
    pub declared_size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub reference: file_reference::Model,
    pub is_duplicate: bool,
    /// Bytes not written because the content was already stored.
    pub storage_saved: u64,
    /// References to the content after this upload.
    pub reference_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Whether the last reference went away and the content was freed.
    pub file_deleted: bool,
    pub storage_freed: u64,
    pub references_remaining: i32,
}

/// A reference together with the live reference count of its content.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub reference: file_reference::Model,
    pub reference_count: i32,
}

/// Per-id result of a bulk delete.
#[derive(Debug)]
pub struct BulkDeleteItem {
    pub id: Uuid,
    pub result: Result<DeleteOutcome, ServiceError>,
}

#[derive(Debug)]
pub struct BulkDeleteOutcome {
    pub results: Vec<BulkDeleteItem>,
    pub deleted: usize,
    pub failed: usize,
    pub storage_freed: u64,
}

/// Outcome of one store attempt that did not succeed.
enum AttemptError {
    /// Lost a race against another writer of the same hash; worth retrying.
    Race(String),
    Failed(ServiceError),
}

impl From<ServiceError> for AttemptError {
    fn from(err: ServiceError) -> Self {
        AttemptError::Failed(err)
    }
}

impl From<DbErr> for AttemptError {
    fn from(err: DbErr) -> Self {
        if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
            AttemptError::Race(err.to_string())
        } else {
            AttemptError::Failed(ServiceError::Database(err))
        }
    }
}

impl From<common::storage::StorageError> for AttemptError {
    fn from(err: common::storage::StorageError) -> Self {
        AttemptError::Failed(err.into())
    }
}

/// Create-or-increment and decrement-or-delete over the catalog and the blob
/// store.
pub struct DedupService {
    db: DatabaseConnection,
    blobs: Arc<dyn BlobStore>,
    locks: Arc<HashLocks>,
    retry: RetryPolicy,
    max_bulk_ids: usize,
    spool_dir: PathBuf,
}

impl DedupService {
    pub fn new(
        db: DatabaseConnection,
        blobs: Arc<dyn BlobStore>,
        locks: Arc<HashLocks>,
        config: &DedupConfig,
    ) -> Self {
        Self {
            db,
            blobs,
            locks,
            retry: config.retry_policy(),
            max_bulk_ids: config.max_bulk_ids,
            spool_dir: std::env::temp_dir().join("dedupe-spool"),
        }
    }

    /// Park incoming uploads under `dir` instead of the system temp directory.
    pub fn with_spool_dir(mut self, dir: PathBuf) -> Self {
        self.spool_dir = dir;
        self
    }

    /// Drop spool files left behind by a crash. Run once at startup.
    pub async fn purge_spool(&self) -> Result<usize, ServiceError> {
        let purged = SpooledUpload::purge_stale(&self.spool_dir).await?;
        if purged > 0 {
            warn!(purged, dir = %self.spool_dir.display(), "Removed stale spooled uploads");
        }
        Ok(purged)
    }

    /// Record one upload of `reader`'s content, storing the bytes only if no
    /// identical content exists yet.
    #[instrument(skip(self, reader, request), fields(filename = %request.filename))]
    pub async fn upload<R>(
        &self,
        reader: R,
        request: UploadRequest,
        size_limit: u64,
    ) -> Result<UploadOutcome, ServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let filename = validate_flat_filename(&request.filename)
            .map_err(|e| ServiceError::Validation(e.message().into()))?
            .to_string();

        if let Some(declared) = request.declared_size
            && declared > size_limit
        {
            return Err(ServiceError::Validation(format!(
                "File exceeds maximum size of {size_limit} bytes ({declared} bytes declared)"
            )));
        }

        let file_type = resolve_media_type(request.declared_type.as_deref(), &filename);

        let spooled = SpooledUpload::write(reader, &self.spool_dir, size_limit).await?;
        let result = if spooled.size == 0 {
            Err(ServiceError::Validation("The submitted file is empty".into()))
        } else {
            self.store(&spooled, &filename, &file_type).await
        };
        spooled.remove().await;

        if let Ok(outcome) = &result {
            info!(
                id = %outcome.reference.id,
                hash = %outcome.reference.content_hash,
                is_duplicate = outcome.is_duplicate,
                reference_count = outcome.reference_count,
                "Upload recorded"
            );
        }
        result
    }

    async fn store(
        &self,
        spooled: &SpooledUpload,
        filename: &str,
        file_type: &str,
    ) -> Result<UploadOutcome, ServiceError> {
        let _guard = self.locks.lock(&spooled.hash).await;
        retry_races(&self.retry, &spooled.hash, move || {
            self.try_store(spooled, filename, file_type)
        })
        .await
    }

    /// One transaction: resolve or create the blob, then add the reference.
    async fn try_store(
        &self,
        spooled: &SpooledUpload,
        filename: &str,
        file_type: &str,
    ) -> Result<UploadOutcome, AttemptError> {
        let txn = self.db.begin().await?;

        let mut placed = false;
        let staged = self
            .stage_upload(&txn, spooled, filename, file_type, &mut placed)
            .await;

        let result = match staged {
            Ok(outcome) => txn.commit().await.map(|_| outcome).map_err(AttemptError::from),
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        };

        // A lost race means another writer owns these bytes now.
        if placed && matches!(result, Err(AttemptError::Failed(_))) {
            self.discard_bytes(&spooled.hash).await;
        }
        result
    }

    async fn stage_upload<C: ConnectionTrait>(
        &self,
        txn: &C,
        spooled: &SpooledUpload,
        filename: &str,
        file_type: &str,
        placed: &mut bool,
    ) -> Result<UploadOutcome, AttemptError> {
        let catalog = Catalog::new(txn);
        let hash = spooled.hash.to_hex();

        let (size, is_duplicate, reference_count) = match catalog.find_blob_for_update(&hash).await? {
            Some(blob) => {
                let next = blob.reference_count + 1;
                if !catalog
                    .swap_reference_count(&hash, blob.reference_count, next)
                    .await?
                {
                    return Err(AttemptError::Race(
                        "reference count changed while incrementing".into(),
                    ));
                }
                (blob.size, true, next)
            }
            None => {
                *placed = !self.blobs.exists(&spooled.hash).await?;
                let stored = self.blobs.put_stream(spooled.reader().await?).await?;
                if stored != spooled.hash {
                    return Err(ServiceError::StorageIo(format!(
                        "stored digest {stored} does not match spooled digest {}",
                        spooled.hash
                    ))
                    .into());
                }
                let size = i64::try_from(spooled.size).map_err(|_| {
                    ServiceError::Validation("File is too large to catalog".into())
                })?;
                catalog
                    .insert_blob(&hash, size, file_type, self.blobs.locator(&spooled.hash))
                    .await?;
                (size, false, 1)
            }
        };

        let reference = catalog
            .insert_reference(NewReference {
                content_hash: &hash,
                original_filename: filename,
                file_type,
                size,
                is_duplicate,
            })
            .await
            .map_err(|e| AttemptError::Failed(e.into()))?;

        Ok(UploadOutcome {
            reference,
            is_duplicate,
            storage_saved: if is_duplicate { size as u64 } else { 0 },
            reference_count,
        })
    }

    async fn discard_bytes(&self, hash: &ContentHash) {
        match self.blobs.delete(hash).await {
            Ok(_) => debug!(%hash, "Removed bytes placed by failed upload"),
            Err(e) => warn!(%hash, error = %e, "Failed to remove bytes placed by failed upload"),
        }
    }

    /// Remove one reference, freeing the content when it was the last.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<DeleteOutcome, ServiceError> {
        let reference = Catalog::new(&self.db)
            .find_reference(id)
            .await?
            .ok_or_else(|| reference_not_found(id))?;
        let hash = ContentHash::from_hex(&reference.content_hash).map_err(|e| {
            ServiceError::Consistency(format!("reference {id} carries a malformed hash: {e}"))
        })?;

        let _guard = self.locks.lock(&hash).await;

        let txn = self.db.begin().await?;
        let outcome = match Self::release(&txn, id).await {
            Ok(outcome) => {
                txn.commit().await?;
                outcome
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        };

        if outcome.file_deleted {
            match self.blobs.delete(&hash).await {
                Ok(true) => {}
                Ok(false) => warn!(%hash, "Freed content had no bytes on disk"),
                Err(e) => warn!(
                    %hash,
                    error = %e,
                    "Failed to unlink freed content; left for the orphan scan"
                ),
            }
        }

        info!(
            %id,
            %hash,
            file_deleted = outcome.file_deleted,
            references_remaining = outcome.references_remaining,
            "Reference deleted"
        );
        Ok(outcome)
    }

    /// Decrement-or-delete inside `txn`.
    async fn release<C: ConnectionTrait>(txn: &C, id: Uuid) -> Result<DeleteOutcome, ServiceError> {
        let catalog = Catalog::new(txn);

        // Re-read under the transaction; a concurrent delete may have won.
        let reference = catalog
            .find_reference(id)
            .await?
            .ok_or_else(|| reference_not_found(id))?;
        let hash = reference.content_hash;

        let blob = catalog.find_blob_for_update(&hash).await?.ok_or_else(|| {
            ServiceError::Consistency(format!("reference {id} points at missing content {hash}"))
        })?;

        if !catalog.delete_reference(id).await? {
            return Err(reference_not_found(id));
        }

        let remaining = (blob.reference_count - 1).max(0);
        if remaining == 0 {
            catalog.delete_blob(&hash).await?;
        } else if !catalog
            .swap_reference_count(&hash, blob.reference_count, remaining)
            .await?
        {
            return Err(ServiceError::Conflict(format!(
                "reference count of {hash} changed while deleting {id}"
            )));
        }

        Ok(DeleteOutcome {
            file_deleted: remaining == 0,
            storage_freed: if remaining == 0 { blob.size as u64 } else { 0 },
            references_remaining: remaining,
        })
    }

    /// Delete each id independently. One failure never aborts the batch.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn bulk_delete(&self, ids: &[Uuid]) -> Result<BulkDeleteOutcome, ServiceError> {
        if ids.is_empty() {
            return Err(ServiceError::Validation("ids must not be empty".into()));
        }
        if ids.len() > self.max_bulk_ids {
            return Err(ServiceError::Validation(format!(
                "Too many ids: max {}",
                self.max_bulk_ids
            )));
        }

        let mut outcome = BulkDeleteOutcome {
            results: Vec::with_capacity(ids.len()),
            deleted: 0,
            failed: 0,
            storage_freed: 0,
        };

        for &id in ids {
            let result = self.delete(id).await;
            match &result {
                Ok(deleted) => {
                    outcome.deleted += 1;
                    outcome.storage_freed += deleted.storage_freed;
                }
                Err(e) => {
                    outcome.failed += 1;
                    warn!(%id, kind = e.kind(), error = %e, "Bulk delete item failed");
                }
            }
            outcome.results.push(BulkDeleteItem { id, result });
        }

        Ok(outcome)
    }

    /// A reference plus a reader over its content.
    #[instrument(skip(self))]
    pub async fn open(&self, id: Uuid) -> Result<(FileRecord, BoxReader), ServiceError> {
        let record = load_record(&self.db, id).await?;
        let hash = ContentHash::from_hex(&record.reference.content_hash).map_err(|e| {
            ServiceError::Consistency(format!("reference {id} carries a malformed hash: {e}"))
        })?;
        let reader = self.blobs.get_stream(&hash).await?;
        Ok((record, reader))
    }
}

/// Run `attempt` until it succeeds, fails outright, or `policy` runs out on
/// creation races. Exhaustion is a [`ServiceError::Conflict`].
async fn retry_races<T, F, Fut>(
    policy: &RetryPolicy,
    hash: &ContentHash,
    mut attempt_once: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut attempt: u8 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match attempt_once().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Race(reason)) if policy.allows_retry_after(attempt) => {
                debug!(attempt, %hash, %reason, "Creation race, retrying");
                tokio::time::sleep(policy.delay_after(attempt)).await;
            }
            Err(AttemptError::Race(reason)) => {
                warn!(attempt, %hash, %reason, "Creation race, giving up");
                return Err(ServiceError::Conflict(format!(
                    "Content {hash} is being created concurrently; retry the upload"
                )));
            }
            Err(AttemptError::Failed(e)) => return Err(e),
        }
    }
}

/// Fetch a reference and its content's live count.
pub(crate) async fn load_record<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<FileRecord, ServiceError> {
    let catalog = Catalog::new(conn);
    let reference = catalog
        .find_reference(id)
        .await?
        .ok_or_else(|| reference_not_found(id))?;
    let blob = catalog.find_blob(&reference.content_hash).await?.ok_or_else(|| {
        ServiceError::Consistency(format!(
            "reference {id} points at missing content {}",
            reference.content_hash
        ))
    })?;
    Ok(FileRecord {
        reference,
        reference_count: blob.reference_count,
    })
}

fn reference_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("File {id} not found"))
}
