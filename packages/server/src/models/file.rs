use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{FileFilter, Page};
use crate::error::ErrorBody;
use crate::services::{BulkDeleteOutcome, DeleteOutcome, FileRecord, UploadOutcome};

use super::shared::{Pagination, split_list};

/// Query parameters for listing and searching files.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct FileListParams {
    /// Case-insensitive filename substring.
    #[param(example = "report")]
    pub search: Option<String>,
    /// Comma-separated media types; a file matching any of them is kept.
    #[param(example = "text/plain,image/png")]
    pub file_types: Option<String>,
    /// Minimum size in bytes (inclusive).
    pub min_size: Option<u64>,
    /// Maximum size in bytes (inclusive).
    pub max_size: Option<u64>,
    /// Earliest upload time (inclusive, RFC 3339).
    pub from_date: Option<DateTime<Utc>>,
    /// Latest upload time (inclusive, RFC 3339).
    pub to_date: Option<DateTime<Utc>>,
    /// Only files whose content is shared with another upload.
    pub duplicates_only: Option<bool>,
    /// `uploaded_at`, `original_filename`, `size` or `file_type`; prefix `-` for descending.
    #[param(example = "-uploaded_at")]
    pub sort_by: Option<String>,
    /// Page number (1-indexed).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Items per page (1-100, default 20).
    #[param(example = 20)]
    pub page_size: Option<u64>,
}

impl FileListParams {
    pub fn filter(&self) -> FileFilter {
        FileFilter {
            search: self.search.clone(),
            file_types: split_list(self.file_types.as_deref()),
            min_size: self.min_size,
            max_size: self.max_size,
            uploaded_from: self.from_date,
            uploaded_to: self.to_date,
            duplicates_only: self.duplicates_only.unwrap_or(false),
        }
    }
}

/// Query parameters for the duplicates listing.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct DuplicateListParams {
    #[param(example = "-size")]
    pub sort_by: Option<String>,
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub page_size: Option<u64>,
}

/// A stored file as seen by clients.
#[derive(Serialize, utoipa::ToSchema)]
pub struct FileResponse {
    /// File reference ID (UUIDv7).
    #[schema(example = "01936f0e-1234-7abc-8000-000000000001")]
    pub id: Uuid,
    #[schema(example = "report.pdf")]
    pub original_filename: String,
    #[schema(example = "application/pdf")]
    pub file_type: String,
    /// Size in bytes.
    #[schema(example = 142857)]
    pub size: i64,
    /// SHA-256 of the content, lowercase hex.
    #[schema(example = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")]
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
    /// Whether identical content was already stored when this file arrived.
    #[schema(example = false)]
    pub is_duplicate: bool,
    /// Uploads currently sharing this content.
    #[schema(example = 1)]
    pub reference_count: i32,
    #[schema(example = "/api/v1/files/01936f0e-1234-7abc-8000-000000000001/content")]
    pub download_url: String,
}

impl From<FileRecord> for FileResponse {
    fn from(record: FileRecord) -> Self {
        let r = record.reference;
        Self {
            download_url: format!("/api/v1/files/{}/content", r.id),
            id: r.id,
            original_filename: r.original_filename,
            file_type: r.file_type,
            size: r.size,
            content_hash: r.content_hash,
            uploaded_at: r.uploaded_at,
            is_duplicate: r.is_duplicate,
            reference_count: record.reference_count,
        }
    }
}

/// Paginated list of files.
#[derive(Serialize, utoipa::ToSchema)]
pub struct FileListResponse {
    pub data: Vec<FileResponse>,
    pub pagination: Pagination,
}

impl From<Page<FileRecord>> for FileListResponse {
    fn from(page: Page<FileRecord>) -> Self {
        let pagination = Pagination::from(&page);
        Self {
            data: page.items.into_iter().map(FileResponse::from).collect(),
            pagination,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub file: FileResponse,
    #[schema(example = true)]
    pub is_duplicate: bool,
    /// Bytes not written because the content was already stored.
    #[schema(example = 142857)]
    pub storage_saved: u64,
    #[schema(example = "Duplicate content detected; existing copy reused")]
    pub message: String,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        let message = if outcome.is_duplicate {
            "Duplicate content detected; existing copy reused"
        } else {
            "File uploaded successfully"
        };
        Self {
            file: FileResponse::from(FileRecord {
                reference: outcome.reference,
                reference_count: outcome.reference_count,
            }),
            is_duplicate: outcome.is_duplicate,
            storage_saved: outcome.storage_saved,
            message: message.into(),
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct FileTypesResponse {
    #[schema(example = json!(["image/png", "text/plain"]))]
    pub file_types: Vec<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DeleteResponse {
    pub id: Uuid,
    /// Whether the content itself was freed.
    #[schema(example = true)]
    pub file_deleted: bool,
    #[schema(example = 142857)]
    pub storage_freed: u64,
    #[schema(example = 0)]
    pub references_remaining: i32,
    #[schema(example = "File and its content deleted")]
    pub message: String,
}

impl DeleteResponse {
    pub fn new(id: Uuid, outcome: DeleteOutcome) -> Self {
        let message = if outcome.file_deleted {
            "File and its content deleted".to_string()
        } else {
            format!(
                "File deleted; content kept for {} other reference(s)",
                outcome.references_remaining
            )
        };
        Self {
            id,
            file_deleted: outcome.file_deleted,
            storage_freed: outcome.storage_freed,
            references_remaining: outcome.references_remaining,
            message,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BulkDeleteRequest {
    /// File IDs to delete (1-100).
    pub ids: Vec<String>,
}

/// Result for one id of a bulk delete.
#[derive(Serialize, utoipa::ToSchema)]
pub struct BulkDeleteItemResponse {
    pub id: Uuid,
    #[schema(example = true)]
    pub success: bool,
    pub file_deleted: Option<bool>,
    pub storage_freed: Option<u64>,
    pub references_remaining: Option<i32>,
    /// Present when this id failed.
    pub error: Option<ErrorBody>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct BulkDeleteResponse {
    pub results: Vec<BulkDeleteItemResponse>,
    #[schema(example = 2)]
    pub deleted: usize,
    #[schema(example = 1)]
    pub failed: usize,
    #[schema(example = 2048)]
    pub storage_freed: u64,
}

impl From<BulkDeleteOutcome> for BulkDeleteResponse {
    fn from(outcome: BulkDeleteOutcome) -> Self {
        let results = outcome
            .results
            .into_iter()
            .map(|item| match item.result {
                Ok(deleted) => BulkDeleteItemResponse {
                    id: item.id,
                    success: true,
                    file_deleted: Some(deleted.file_deleted),
                    storage_freed: Some(deleted.storage_freed),
                    references_remaining: Some(deleted.references_remaining),
                    error: None,
                },
                Err(e) => BulkDeleteItemResponse {
                    id: item.id,
                    success: false,
                    file_deleted: None,
                    storage_freed: None,
                    references_remaining: None,
                    error: Some(ErrorBody {
                        code: e.kind(),
                        message: e.to_string(),
                    }),
                },
            })
            .collect();

        Self {
            results,
            deleted: outcome.deleted,
            failed: outcome.failed,
            storage_freed: outcome.storage_freed,
        }
    }
}
