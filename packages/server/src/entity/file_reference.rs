use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_reference")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub content_hash: String,

    #[sea_orm(belongs_to, from = "content_hash", to = "content_hash")]
    pub content_blob: Option<super::content_blob::Entity>,

    /// Filename as uploaded.
    pub original_filename: String,

    /// Trimmed, lower-cased filename used for search.
    pub filename_normalized: String,

    /// Declared MIME type.
    pub file_type: String,

    /// Purposefully denormalized to avoid JOINs for list queries.
    pub size: i64,

    pub uploaded_at: DateTimeUtc,

    /// Whether the content already existed when this reference was created.
    pub is_duplicate: bool,
}

impl ActiveModelBehavior for ActiveModel {}

/// Search form of a filename.
pub fn normalize_filename(filename: &str) -> String {
    filename.trim().to_lowercase()
}
