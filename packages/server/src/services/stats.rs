use sea_orm::ConnectionTrait;
use tracing::instrument;

use super::ServiceError;
use crate::catalog::{Catalog, FileTypeTotals};
use crate::entity::{content_blob, file_reference};

/// How many rows each detailed-stats list carries.
pub const TOP_N: u64 = 10;

/// Catalog-wide storage totals, recomputed on every read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageStats {
    pub total_files_uploaded: u64,
    pub unique_files_stored: u64,
    pub total_size_uploaded: u64,
    pub actual_size_stored: u64,
    pub storage_saved: u64,
    pub savings_percentage: f64,
    pub deduplication_ratio: f64,
}

impl StorageStats {
    pub fn from_totals(
        total_files_uploaded: u64,
        unique_files_stored: u64,
        total_size_uploaded: u64,
        actual_size_stored: u64,
    ) -> Self {
        let storage_saved = total_size_uploaded.saturating_sub(actual_size_stored);
        let savings_percentage = if total_size_uploaded == 0 {
            0.0
        } else {
            round2(storage_saved as f64 / total_size_uploaded as f64 * 100.0)
        };
        let deduplication_ratio = if unique_files_stored == 0 {
            1.0
        } else {
            round2(total_files_uploaded as f64 / unique_files_stored as f64)
        };

        Self {
            total_files_uploaded,
            unique_files_stored,
            total_size_uploaded,
            actual_size_stored,
            storage_saved,
            savings_percentage,
            deduplication_ratio,
        }
    }
}

/// Usage of one media type, attributed by each blob's first declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeUsage {
    pub file_type: String,
    pub blob_count: u64,
    pub stored_size: u64,
    pub total_references: u64,
    /// Bytes the references would occupy without deduplication.
    pub logical_size: u64,
}

#[derive(Debug, Clone)]
pub struct DetailedStats {
    pub summary: StorageStats,
    pub by_file_type: Vec<FileTypeUsage>,
    pub most_referenced: Vec<content_blob::Model>,
    pub recent_uploads: Vec<file_reference::Model>,
    pub recent_duplicates: Vec<file_reference::Model>,
}

pub struct StatsService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> StatsService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    #[instrument(skip(self))]
    pub async fn basic_stats(&self) -> Result<StorageStats, ServiceError> {
        let catalog = Catalog::new(self.conn);
        let (total_files, uploaded) = catalog.reference_totals().await?;
        let (unique_files, stored) = catalog.blob_totals().await?;

        Ok(StorageStats::from_totals(
            total_files,
            unique_files,
            uploaded,
            stored,
        ))
    }

    #[instrument(skip(self))]
    pub async fn detailed_stats(&self) -> Result<DetailedStats, ServiceError> {
        let summary = self.basic_stats().await?;
        let catalog = Catalog::new(self.conn);

        let by_file_type = rank_file_types(catalog.usage_by_file_type().await?);
        let most_referenced = catalog.most_referenced(TOP_N).await?;
        let recent_uploads = catalog.recent_references(false, TOP_N).await?;
        let recent_duplicates = catalog.recent_references(true, TOP_N).await?;

        Ok(DetailedStats {
            summary,
            by_file_type,
            most_referenced,
            recent_uploads,
            recent_duplicates,
        })
    }
}

/// Convert grouped totals, largest stored size first.
fn rank_file_types(rows: Vec<FileTypeTotals>) -> Vec<FileTypeUsage> {
    let unsigned = |v: Option<i64>| u64::try_from(v.unwrap_or(0)).unwrap_or(0);

    let mut usage: Vec<FileTypeUsage> = rows
        .into_iter()
        .map(|row| FileTypeUsage {
            blob_count: unsigned(Some(row.blob_count)),
            stored_size: unsigned(row.stored_size),
            total_references: unsigned(row.total_references),
            logical_size: unsigned(row.logical_size),
            file_type: row.file_type,
        })
        .collect();
    usage.sort_by(|a, b| {
        b.stored_size
            .cmp(&a.stored_size)
            .then_with(|| a.file_type.cmp(&b.file_type))
    });
    usage
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
