use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::entity::{content_blob, file_reference};
use crate::services::{
    CollectOutcome, DetailedStats, FileTypeUsage, OrphanReport, StorageStats, UntrackedEntry,
};

/// Storage totals across the whole catalog.
#[derive(Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    #[schema(example = 12)]
    pub total_files_uploaded: u64,
    #[schema(example = 9)]
    pub unique_files_stored: u64,
    /// Bytes uploaded, counting every duplicate.
    #[schema(example = 4096)]
    pub total_size_uploaded: u64,
    /// Bytes actually held in storage.
    #[schema(example = 3072)]
    pub actual_size_stored: u64,
    #[schema(example = 1024)]
    pub storage_saved: u64,
    #[schema(example = 25.0)]
    pub savings_percentage: f64,
    /// Uploads per stored blob.
    #[schema(example = 1.33)]
    pub deduplication_ratio: f64,
}

impl From<StorageStats> for StatsResponse {
    fn from(s: StorageStats) -> Self {
        Self {
            total_files_uploaded: s.total_files_uploaded,
            unique_files_stored: s.unique_files_stored,
            total_size_uploaded: s.total_size_uploaded,
            actual_size_stored: s.actual_size_stored,
            storage_saved: s.storage_saved,
            savings_percentage: s.savings_percentage,
            deduplication_ratio: s.deduplication_ratio,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct FileTypeStatsResponse {
    #[schema(example = "text/plain")]
    pub file_type: String,
    #[schema(example = 3)]
    pub blob_count: u64,
    #[schema(example = 2048)]
    pub stored_size: u64,
    #[schema(example = 5)]
    pub total_references: u64,
    /// Size the references would take without deduplication.
    #[schema(example = 3500)]
    pub logical_size: u64,
}

impl From<FileTypeUsage> for FileTypeStatsResponse {
    fn from(u: FileTypeUsage) -> Self {
        Self {
            file_type: u.file_type,
            blob_count: u.blob_count,
            stored_size: u.stored_size,
            total_references: u.total_references,
            logical_size: u.logical_size,
        }
    }
}

/// A stored piece of content.
#[derive(Serialize, utoipa::ToSchema)]
pub struct BlobResponse {
    pub content_hash: String,
    pub size: i64,
    pub file_type: String,
    pub storage_path: String,
    pub reference_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<content_blob::Model> for BlobResponse {
    fn from(m: content_blob::Model) -> Self {
        Self {
            content_hash: m.content_hash,
            size: m.size,
            file_type: m.file_type,
            storage_path: m.storage_path,
            reference_count: m.reference_count,
            created_at: m.created_at,
        }
    }
}

/// Upload summary for activity lists.
#[derive(Serialize, utoipa::ToSchema)]
pub struct RecentUploadResponse {
    pub id: Uuid,
    pub original_filename: String,
    pub file_type: String,
    pub size: i64,
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
    pub is_duplicate: bool,
}

impl From<file_reference::Model> for RecentUploadResponse {
    fn from(m: file_reference::Model) -> Self {
        Self {
            id: m.id,
            original_filename: m.original_filename,
            file_type: m.file_type,
            size: m.size,
            content_hash: m.content_hash,
            uploaded_at: m.uploaded_at,
            is_duplicate: m.is_duplicate,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DetailedStatsResponse {
    pub summary: StatsResponse,
    /// Per media type, largest stored size first.
    pub by_file_type: Vec<FileTypeStatsResponse>,
    /// Most shared content (more than one reference), top 10.
    pub most_referenced: Vec<BlobResponse>,
    pub recent_uploads: Vec<RecentUploadResponse>,
    pub recent_duplicates: Vec<RecentUploadResponse>,
}

impl From<DetailedStats> for DetailedStatsResponse {
    fn from(d: DetailedStats) -> Self {
        Self {
            summary: d.summary.into(),
            by_file_type: d.by_file_type.into_iter().map(Into::into).collect(),
            most_referenced: d.most_referenced.into_iter().map(Into::into).collect(),
            recent_uploads: d.recent_uploads.into_iter().map(Into::into).collect(),
            recent_duplicates: d.recent_duplicates.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UntrackedEntryResponse {
    pub content_hash: String,
    /// Size on disk, if it could be read.
    pub size: Option<u64>,
}

impl From<UntrackedEntry> for UntrackedEntryResponse {
    fn from(e: UntrackedEntry) -> Self {
        Self {
            content_hash: e.content_hash,
            size: e.size,
        }
    }
}

/// Reconciliation findings.
#[derive(Serialize, utoipa::ToSchema)]
pub struct OrphanReportResponse {
    /// Blob rows with no references left. Collectable.
    pub zero_reference_blobs: Vec<BlobResponse>,
    /// Stored bytes with no blob row. Needs manual review.
    pub untracked_entries: Vec<UntrackedEntryResponse>,
    #[schema(example = 0)]
    pub total: usize,
    pub scanned_at: DateTime<Utc>,
}

impl From<OrphanReport> for OrphanReportResponse {
    fn from(r: OrphanReport) -> Self {
        Self {
            total: r.zero_reference_blobs.len() + r.untracked_entries.len(),
            zero_reference_blobs: r.zero_reference_blobs.into_iter().map(Into::into).collect(),
            untracked_entries: r.untracked_entries.into_iter().map(Into::into).collect(),
            scanned_at: r.scanned_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CollectResponse {
    /// Hashes whose rows and bytes were removed.
    pub collected: Vec<String>,
    /// Hashes that were left alone.
    pub skipped: Vec<String>,
    #[schema(example = 0)]
    pub storage_freed: u64,
}

impl From<CollectOutcome> for CollectResponse {
    fn from(c: CollectOutcome) -> Self {
        Self {
            collected: c.collected,
            skipped: c.skipped,
            storage_freed: c.storage_freed,
        }
    }
}
