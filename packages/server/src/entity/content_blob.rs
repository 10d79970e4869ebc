use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "content_blob")]
pub struct Model {
    /// SHA-256 content hash, lowercase hex.
    #[sea_orm(primary_key, auto_increment = false)]
    pub content_hash: String,

    /// Size of the stored bytes.
    pub size: i64,

    /// Media type declared by the first upload of these bytes.
    pub file_type: String,

    /// Locator relative to the blob store root.
    pub storage_path: String,

    /// Live `file_reference` rows pointing here.
    pub reference_count: i32,

    pub created_at: DateTimeUtc,

    #[sea_orm(has_many)]
    pub file_references: HasMany<super::file_reference::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
