use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::storage::FilesystemBlobStore;
use dedupe_server::config::AppConfig;
use dedupe_server::services::spawn_orphan_scan;
use dedupe_server::state::AppState;
use dedupe_server::{build_router, database, schema};
use tracing::{Level, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = database::init_db(&config.database)
        .await
        .context("Failed to initialise database")?;
    schema::ensure_indexes(&db).await?;

    let blob_store = FilesystemBlobStore::new(
        config.storage.root.clone(),
        config.storage.max_upload_size,
    )
    .await
    .context("Failed to open blob storage")?;
    info!(root = %blob_store.root().display(), "Blob storage ready");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let reconcile = config.reconcile.clone();

    let state = AppState::new(db, config, Arc::new(blob_store));
    state
        .dedup
        .purge_spool()
        .await
        .context("Failed to purge upload spool")?;

    if let Some(secs) = reconcile.scan_interval_secs.filter(|s| *s > 0) {
        spawn_orphan_scan(
            state.scanner.clone(),
            Duration::from_secs(secs),
            reconcile.auto_collect,
        );
    }

    let app = build_router(state);

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
