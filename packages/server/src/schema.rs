use sea_orm::sea_query::{Index, IndexCreateStatement, PostgresQueryBuilder, SqliteQueryBuilder};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr};
use tracing::{info, warn};

use crate::entity::{content_blob, file_reference};

/// Ensure the secondary indexes search and stats rely on.
///
/// Schema sync only creates primary keys and uniques, so composite and
/// plain indexes are created here on startup. Failures are logged, not fatal.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let indexes = [
        // Multi-filter search: WHERE file_type IN (..) AND size BETWEEN .. ORDER BY uploaded_at
        (
            "idx_file_reference_type_size_uploaded",
            Index::create()
                .if_not_exists()
                .name("idx_file_reference_type_size_uploaded")
                .table(file_reference::Entity)
                .col(file_reference::Column::FileType)
                .col(file_reference::Column::Size)
                .col(file_reference::Column::UploadedAt)
                .to_owned(),
        ),
        (
            "idx_file_reference_filename",
            Index::create()
                .if_not_exists()
                .name("idx_file_reference_filename")
                .table(file_reference::Entity)
                .col(file_reference::Column::FilenameNormalized)
                .to_owned(),
        ),
        (
            "idx_file_reference_uploaded",
            Index::create()
                .if_not_exists()
                .name("idx_file_reference_uploaded")
                .table(file_reference::Entity)
                .col(file_reference::Column::UploadedAt)
                .to_owned(),
        ),
        (
            "idx_file_reference_hash",
            Index::create()
                .if_not_exists()
                .name("idx_file_reference_hash")
                .table(file_reference::Entity)
                .col(file_reference::Column::ContentHash)
                .to_owned(),
        ),
        (
            "idx_content_blob_refcount",
            Index::create()
                .if_not_exists()
                .name("idx_content_blob_refcount")
                .table(content_blob::Entity)
                .col(content_blob::Column::ReferenceCount)
                .to_owned(),
        ),
    ];

    let backend = db.get_database_backend();
    for (name, stmt) in &indexes {
        match db.execute_unprepared(&render(backend, stmt)).await {
            Ok(_) => info!("Ensured index {} exists", name),
            Err(e) => warn!("Failed to create index {}: {}", name, e),
        }
    }

    Ok(())
}

fn render(backend: DbBackend, stmt: &IndexCreateStatement) -> String {
    match backend {
        DbBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        _ => stmt.to_string(PostgresQueryBuilder),
    }
}
