use std::sync::Arc;

use common::storage::BlobStore;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::services::{DedupService, HashLocks, OrphanScanner, SearchService, StatsService};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub dedup: Arc<DedupService>,
    pub scanner: Arc<OrphanScanner>,
}

impl AppState {
    /// Wire the services around one blob store and one lock table.
    pub fn new(db: DatabaseConnection, config: AppConfig, blob_store: Arc<dyn BlobStore>) -> Self {
        let locks = Arc::new(HashLocks::default());
        let dedup = DedupService::new(db.clone(), blob_store.clone(), locks.clone(), &config.dedup)
            .with_spool_dir(config.storage.root.join(".spool"));
        let scanner = OrphanScanner::new(db.clone(), blob_store, locks);

        Self {
            db,
            config: Arc::new(config),
            dedup: Arc::new(dedup),
            scanner: Arc::new(scanner),
        }
    }

    pub fn search(&self) -> SearchService<'_, DatabaseConnection> {
        SearchService::new(&self.db, self.config.search)
    }

    pub fn stats(&self) -> StatsService<'_, DatabaseConnection> {
        StatsService::new(&self.db)
    }
}
