use sea_orm::ConnectionTrait;
use tracing::instrument;
use uuid::Uuid;

use super::ServiceError;
use super::dedup::{FileRecord, load_record};
use crate::catalog::{Catalog, FileFilter, Page, PageRequest, SortKey};
use crate::config::SearchConfig;

/// Read-only queries over the catalog.
pub struct SearchService<'a, C: ConnectionTrait> {
    conn: &'a C,
    config: SearchConfig,
}

impl<'a, C: ConnectionTrait> SearchService<'a, C> {
    pub fn new(conn: &'a C, config: SearchConfig) -> Self {
        Self { conn, config }
    }

    /// Filtered, sorted page of references with their live reference counts.
    #[instrument(skip(self))]
    pub async fn query(
        &self,
        filter: &FileFilter,
        sort: SortKey,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> Result<Page<FileRecord>, ServiceError> {
        filter.validate()?;
        let request = PageRequest::resolve(page, page_size, &self.config)?;

        let catalog = Catalog::new(self.conn);
        let (references, total) = catalog.search(filter, sort, request).await?;

        let hashes: Vec<&str> = references.iter().map(|r| r.content_hash.as_str()).collect();
        let counts = catalog.reference_counts(&hashes).await?;

        let items = references
            .into_iter()
            .map(|reference| {
                let reference_count = counts.get(&reference.content_hash).copied().unwrap_or(0);
                FileRecord {
                    reference,
                    reference_count,
                }
            })
            .collect();

        Ok(Page::new(items, request, total))
    }

    /// References whose content is shared by more than one upload.
    pub async fn duplicates(
        &self,
        sort: SortKey,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> Result<Page<FileRecord>, ServiceError> {
        self.query(&FileFilter::duplicates(), sort, page, page_size)
            .await
    }

    /// Distinct declared media types, sorted.
    pub async fn file_types(&self) -> Result<Vec<String>, ServiceError> {
        Ok(Catalog::new(self.conn).distinct_file_types().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<FileRecord, ServiceError> {
        load_record(self.conn, id).await
    }
}
