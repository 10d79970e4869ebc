pub mod dedup;
pub mod error;
pub mod locks;
pub mod orphans;
pub mod search;
pub mod spool;
pub mod stats;

pub use dedup::{
    BulkDeleteItem, BulkDeleteOutcome, DedupService, DeleteOutcome, FileRecord, UploadOutcome,
    UploadRequest,
};
pub use error::ServiceError;
pub use locks::HashLocks;
pub use orphans::{CollectOutcome, OrphanReport, OrphanScanner, UntrackedEntry, spawn_orphan_scan};
pub use search::SearchService;
pub use stats::{DetailedStats, FileTypeUsage, StatsService, StorageStats};
