use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::storage::{BlobStore, ContentHash};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use super::ServiceError;
use super::locks::HashLocks;
use crate::catalog::Catalog;
use crate::entity::content_blob;

/// Bytes on disk that no blob row accounts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntrackedEntry {
    pub content_hash: String,
    /// `None` when the entry vanished while it was being inspected.
    pub size: Option<u64>,
}

/// Findings of one reconciliation scan.
#[derive(Debug, Clone)]
pub struct OrphanReport {
    /// Blob rows nothing references any more. Safe to collect.
    pub zero_reference_blobs: Vec<content_blob::Model>,
    /// Stored bytes with no blob row. Flagged for manual review only.
    pub untracked_entries: Vec<UntrackedEntry>,
    pub scanned_at: DateTime<Utc>,
}

impl OrphanReport {
    pub fn is_clean(&self) -> bool {
        self.zero_reference_blobs.is_empty() && self.untracked_entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectOutcome {
    /// Hashes whose row and bytes were removed.
    pub collected: Vec<String>,
    pub storage_freed: u64,
    /// Hashes left alone because they gained a reference meanwhile.
    pub skipped: Vec<String>,
}

/// Cross-checks the catalog against the blob store.
pub struct OrphanScanner {
    db: DatabaseConnection,
    blobs: Arc<dyn BlobStore>,
    locks: Arc<HashLocks>,
}

impl OrphanScanner {
    pub fn new(db: DatabaseConnection, blobs: Arc<dyn BlobStore>, locks: Arc<HashLocks>) -> Self {
        Self { db, blobs, locks }
    }

    /// Report zero-reference blob rows and untracked stored bytes.
    #[instrument(skip(self))]
    pub async fn orphaned_files(&self) -> Result<OrphanReport, ServiceError> {
        let catalog = Catalog::new(&self.db);
        let zero_reference_blobs = catalog.zero_reference_blobs().await?;

        let known: HashSet<String> = catalog.blob_hashes().await?.into_iter().collect();
        let mut untracked_entries = Vec::new();
        for hash in self.blobs.list().await? {
            let hex = hash.to_hex();
            if known.contains(&hex) {
                continue;
            }
            if let Some(entry) = self.confirm_untracked(&hash).await? {
                untracked_entries.push(entry);
            }
        }

        let report = OrphanReport {
            zero_reference_blobs,
            untracked_entries,
            scanned_at: Utc::now(),
        };

        if report.is_clean() {
            info!("Orphan scan found nothing");
        } else {
            warn!(
                zero_reference = report.zero_reference_blobs.len(),
                untracked = report.untracked_entries.len(),
                "Orphan scan found inconsistencies"
            );
        }
        Ok(report)
    }

    /// Re-check a candidate under its hash lock so an upload that has placed
    /// bytes but not yet committed is not reported.
    async fn confirm_untracked(
        &self,
        hash: &ContentHash,
    ) -> Result<Option<UntrackedEntry>, ServiceError> {
        let _guard = self.locks.lock(hash).await;
        let hex = hash.to_hex();

        if Catalog::new(&self.db).find_blob(&hex).await?.is_some() {
            return Ok(None);
        }
        if !self.blobs.exists(hash).await? {
            return Ok(None);
        }
        let size = self.blobs.size(hash).await.ok();
        Ok(Some(UntrackedEntry {
            content_hash: hex,
            size,
        }))
    }

    /// Free every blob row whose reference count is zero, then its bytes.
    #[instrument(skip(self))]
    pub async fn collect_garbage(&self) -> Result<CollectOutcome, ServiceError> {
        let candidates = Catalog::new(&self.db).zero_reference_blobs().await?;
        let mut outcome = CollectOutcome::default();

        for blob in candidates {
            let hash = ContentHash::from_hex(&blob.content_hash).map_err(|e| {
                ServiceError::Consistency(format!("blob row with malformed hash: {e}"))
            })?;

            let _guard = self.locks.lock(&hash).await;

            let txn = self.db.begin().await?;
            let catalog = Catalog::new(&txn);
            let still_referenced = catalog.count_references_to(&blob.content_hash).await? > 0;
            let removed = if still_referenced {
                false
            } else {
                catalog.delete_unreferenced_blob(&blob.content_hash).await?
            };
            txn.commit().await?;

            if !removed {
                if still_referenced {
                    warn!(
                        hash = %blob.content_hash,
                        "Blob has reference_count 0 but live references; left for review"
                    );
                }
                outcome.skipped.push(blob.content_hash);
                continue;
            }

            if let Err(e) = self.blobs.delete(&hash).await {
                warn!(hash = %blob.content_hash, error = %e, "Failed to unlink collected blob");
            }
            outcome.storage_freed += blob.size.max(0) as u64;
            outcome.collected.push(blob.content_hash);
        }

        info!(
            collected = outcome.collected.len(),
            skipped = outcome.skipped.len(),
            storage_freed = outcome.storage_freed,
            "Garbage collection finished"
        );
        Ok(outcome)
    }
}

/// Run the orphan scan periodically in the background.
pub fn spawn_orphan_scan(
    scanner: Arc<OrphanScanner>,
    interval: Duration,
    auto_collect: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            auto_collect, "Starting orphan scanner"
        );

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let report = match scanner.orphaned_files().await {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, "Orphan scan failed");
                    continue;
                }
            };

            if auto_collect
                && !report.zero_reference_blobs.is_empty()
                && let Err(e) = scanner.collect_garbage().await
            {
                error!(error = %e, "Garbage collection failed");
            }
        }
    })
}
