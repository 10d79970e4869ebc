//! Persistence port for blobs and references.
//!
//! Every statement the services issue goes through [`Catalog`], which runs on
//! whatever connection it is given: the pool for reads, a transaction for the
//! create-or-increment and decrement-or-delete sequences.

pub mod query;

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::{Expr, ExprTrait, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::entity::{content_blob, file_reference};

pub use query::{FileFilter, Page, PageRequest, SortField, SortKey};

/// One row of [`Catalog::usage_by_file_type`]. Sums are `None` only for
/// empty groups.
#[derive(Debug, Clone, FromQueryResult)]
pub struct FileTypeTotals {
    pub file_type: String,
    pub blob_count: i64,
    pub stored_size: Option<i64>,
    pub total_references: Option<i64>,
    pub logical_size: Option<i64>,
}

/// Fields of a reference about to be recorded.
#[derive(Debug, Clone)]
pub struct NewReference<'r> {
    pub content_hash: &'r str,
    pub original_filename: &'r str,
    pub file_type: &'r str,
    pub size: i64,
    pub is_duplicate: bool,
}

pub struct Catalog<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> Catalog<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find_blob(&self, hash: &str) -> Result<Option<content_blob::Model>, DbErr> {
        content_blob::Entity::find_by_id(hash.to_string())
            .one(self.conn)
            .await
    }

    /// Get a blob row with FOR UPDATE lock.
    pub async fn find_blob_for_update(
        &self,
        hash: &str,
    ) -> Result<Option<content_blob::Model>, DbErr> {
        content_blob::Entity::find_by_id(hash.to_string())
            .lock(LockType::Update)
            .one(self.conn)
            .await
    }

    /// Record a blob with a single reference. A concurrent creator of the same
    /// hash surfaces as a unique-constraint violation.
    pub async fn insert_blob(
        &self,
        hash: &str,
        size: i64,
        file_type: &str,
        storage_path: String,
    ) -> Result<content_blob::Model, DbErr> {
        content_blob::ActiveModel {
            content_hash: Set(hash.to_string()),
            size: Set(size),
            file_type: Set(file_type.to_string()),
            storage_path: Set(storage_path),
            reference_count: Set(1),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }

    /// Move `reference_count` from `expected` to `next`.
    ///
    /// Returns `false` when the stored count was no longer `expected`.
    pub async fn swap_reference_count(
        &self,
        hash: &str,
        expected: i32,
        next: i32,
    ) -> Result<bool, DbErr> {
        let result = content_blob::Entity::update_many()
            .col_expr(content_blob::Column::ReferenceCount, Expr::value(next))
            .filter(content_blob::Column::ContentHash.eq(hash))
            .filter(content_blob::Column::ReferenceCount.eq(expected))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn delete_blob(&self, hash: &str) -> Result<bool, DbErr> {
        let result = content_blob::Entity::delete_by_id(hash.to_string())
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Delete a blob row only while nothing references it.
    pub async fn delete_unreferenced_blob(&self, hash: &str) -> Result<bool, DbErr> {
        let result = content_blob::Entity::delete_many()
            .filter(content_blob::Column::ContentHash.eq(hash))
            .filter(content_blob::Column::ReferenceCount.eq(0))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn insert_reference(
        &self,
        new: NewReference<'_>,
    ) -> Result<file_reference::Model, DbErr> {
        file_reference::ActiveModel {
            id: Set(Uuid::now_v7()),
            content_hash: Set(new.content_hash.to_string()),
            original_filename: Set(new.original_filename.to_string()),
            filename_normalized: Set(file_reference::normalize_filename(new.original_filename)),
            file_type: Set(new.file_type.to_string()),
            size: Set(new.size),
            uploaded_at: Set(Utc::now()),
            is_duplicate: Set(new.is_duplicate),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }

    pub async fn find_reference(&self, id: Uuid) -> Result<Option<file_reference::Model>, DbErr> {
        file_reference::Entity::find_by_id(id).one(self.conn).await
    }

    pub async fn delete_reference(&self, id: Uuid) -> Result<bool, DbErr> {
        let result = file_reference::Entity::delete_by_id(id)
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn count_references_to(&self, hash: &str) -> Result<u64, DbErr> {
        file_reference::Entity::find()
            .filter(file_reference::Column::ContentHash.eq(hash))
            .count(self.conn)
            .await
    }

    /// Current reference counts for the given hashes. Hashes without a blob
    /// row are absent from the map.
    pub async fn reference_counts(&self, hashes: &[&str]) -> Result<HashMap<String, i32>, DbErr> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, i32)> = content_blob::Entity::find()
            .select_only()
            .column(content_blob::Column::ContentHash)
            .column(content_blob::Column::ReferenceCount)
            .filter(content_blob::Column::ContentHash.is_in(hashes.iter().copied()))
            .into_tuple()
            .all(self.conn)
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// One page of references matching `filter`, plus the total match count.
    pub async fn search(
        &self,
        filter: &FileFilter,
        sort: SortKey,
        page: PageRequest,
    ) -> Result<(Vec<file_reference::Model>, u64), DbErr> {
        let query = filter.apply(file_reference::Entity::find());

        let total = query.clone().count(self.conn).await?;
        if page.offset() >= total {
            return Ok((Vec::new(), total));
        }

        let items = query
            .order_by(sort.column(), sort.order())
            .order_by_asc(file_reference::Column::Id)
            .offset(page.offset())
            .limit(page.per_page)
            .all(self.conn)
            .await?;

        Ok((items, total))
    }

    pub async fn distinct_file_types(&self) -> Result<Vec<String>, DbErr> {
        file_reference::Entity::find()
            .select_only()
            .column(file_reference::Column::FileType)
            .distinct()
            .order_by_asc(file_reference::Column::FileType)
            .into_tuple()
            .all(self.conn)
            .await
    }

    /// `(reference count, summed reference size)`.
    pub async fn reference_totals(&self) -> Result<(u64, u64), DbErr> {
        let row: Option<(i64, Option<i64>)> = file_reference::Entity::find()
            .select_only()
            .column_as(file_reference::Column::Id.count(), "files")
            .column_as(
                file_reference::Column::Size.sum().cast_as("bigint"),
                "bytes",
            )
            .into_tuple()
            .one(self.conn)
            .await?;
        Ok(unsigned_totals(row))
    }

    /// `(blob count, summed stored size)`.
    pub async fn blob_totals(&self) -> Result<(u64, u64), DbErr> {
        let row: Option<(i64, Option<i64>)> = content_blob::Entity::find()
            .select_only()
            .column_as(content_blob::Column::ContentHash.count(), "blobs")
            .column_as(content_blob::Column::Size.sum().cast_as("bigint"), "bytes")
            .into_tuple()
            .one(self.conn)
            .await?;
        Ok(unsigned_totals(row))
    }

    /// Blob usage grouped by the media type recorded on each blob.
    pub async fn usage_by_file_type(&self) -> Result<Vec<FileTypeTotals>, DbErr> {
        content_blob::Entity::find()
            .select_only()
            .column(content_blob::Column::FileType)
            .column_as(content_blob::Column::ContentHash.count(), "blob_count")
            .column_as(
                content_blob::Column::Size.sum().cast_as("bigint"),
                "stored_size",
            )
            .column_as(
                content_blob::Column::ReferenceCount.sum().cast_as("bigint"),
                "total_references",
            )
            .column_as(
                Expr::col(content_blob::Column::Size)
                    .mul(Expr::col(content_blob::Column::ReferenceCount))
                    .sum()
                    .cast_as("bigint"),
                "logical_size",
            )
            .group_by(content_blob::Column::FileType)
            .into_model::<FileTypeTotals>()
            .all(self.conn)
            .await
    }

    pub async fn most_referenced(&self, limit: u64) -> Result<Vec<content_blob::Model>, DbErr> {
        content_blob::Entity::find()
            .filter(content_blob::Column::ReferenceCount.gt(1))
            .order_by_desc(content_blob::Column::ReferenceCount)
            .order_by_desc(content_blob::Column::CreatedAt)
            .limit(limit)
            .all(self.conn)
            .await
    }

    pub async fn recent_references(
        &self,
        duplicates_only: bool,
        limit: u64,
    ) -> Result<Vec<file_reference::Model>, DbErr> {
        let mut query = file_reference::Entity::find();
        if duplicates_only {
            query = query.filter(file_reference::Column::IsDuplicate.eq(true));
        }
        query
            .order_by_desc(file_reference::Column::UploadedAt)
            .order_by_desc(file_reference::Column::Id)
            .limit(limit)
            .all(self.conn)
            .await
    }

    pub async fn zero_reference_blobs(&self) -> Result<Vec<content_blob::Model>, DbErr> {
        content_blob::Entity::find()
            .filter(content_blob::Column::ReferenceCount.lte(0))
            .order_by_asc(content_blob::Column::CreatedAt)
            .all(self.conn)
            .await
    }

    /// Every hash with a blob row.
    pub async fn blob_hashes(&self) -> Result<Vec<String>, DbErr> {
        content_blob::Entity::find()
            .select_only()
            .column(content_blob::Column::ContentHash)
            .into_tuple()
            .all(self.conn)
            .await
    }
}

fn unsigned_totals(row: Option<(i64, Option<i64>)>) -> (u64, u64) {
    let (count, sum) = row.unwrap_or((0, None));
    (
        u64::try_from(count).unwrap_or(0),
        u64::try_from(sum.unwrap_or(0)).unwrap_or(0),
    )
}
