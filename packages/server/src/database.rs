use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

use tracing::info;

use crate::config::DatabaseConfig;

/// Connect and bring the catalog schema up to date with the entities.
pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.to_owned());

    let mut max = config.max_connections.max(1);
    // SQLite has a single writer; concurrent write transactions on separate
    // connections fail with SQLITE_BUSY instead of queueing.
    if config.url.starts_with("sqlite:") && max > 1 {
        info!(requested = max, "SQLite catalog, using a single connection");
        max = 1;
    }
    opt.max_connections(max)
        .min_connections(config.min_connections.min(max))
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("dedupe_server::entity::*")
        .sync(&db)
        .await?;

    Ok(db)
}
