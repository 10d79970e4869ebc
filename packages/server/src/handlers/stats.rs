use axum::Json;
use axum::extract::State;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::models::stats::{
    CollectResponse, DetailedStatsResponse, OrphanReportResponse, StatsResponse,
};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/stats",
    tag = "Stats",
    operation_id = "getStats",
    summary = "Storage statistics",
    description = "Upload and storage totals, bytes saved by deduplication and the \
        deduplication ratio.",
    responses(
        (status = 200, description = "Storage statistics", body = StatsResponse),
    ),
)]
#[instrument(skip(state))]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.stats().basic_stats().await?;
    Ok(Json(stats.into()))
}

#[utoipa::path(
    get,
    path = "/stats/detailed",
    tag = "Stats",
    operation_id = "getDetailedStats",
    summary = "Detailed storage statistics",
    description = "Totals plus a per media type breakdown, the most shared content and \
        recent activity.",
    responses(
        (status = 200, description = "Detailed statistics", body = DetailedStatsResponse),
    ),
)]
#[instrument(skip(state))]
pub async fn get_detailed_stats(
    State(state): State<AppState>,
) -> Result<Json<DetailedStatsResponse>, AppError> {
    let stats = state.stats().detailed_stats().await?;
    Ok(Json(stats.into()))
}

#[utoipa::path(
    get,
    path = "/stats/orphans",
    tag = "Stats",
    operation_id = "getOrphans",
    summary = "Reconciliation report",
    description = "Blob rows with no remaining references, and stored bytes the catalog does \
        not know about.",
    responses(
        (status = 200, description = "Orphan report", body = OrphanReportResponse),
        (status = 500, description = "Storage could not be listed (STORAGE_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_orphans(
    State(state): State<AppState>,
) -> Result<Json<OrphanReportResponse>, AppError> {
    let report = state.scanner.orphaned_files().await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    post,
    path = "/stats/orphans/collect",
    tag = "Stats",
    operation_id = "collectOrphans",
    summary = "Free unreferenced content",
    description = "Deletes blob rows whose reference count is zero along with their bytes. \
        Untracked bytes are never touched.",
    responses(
        (status = 200, description = "What was freed", body = CollectResponse),
    ),
)]
#[instrument(skip(state))]
pub async fn collect_orphans(
    State(state): State<AppState>,
) -> Result<Json<CollectResponse>, AppError> {
    let outcome = state.scanner.collect_garbage().await?;
    Ok(Json(outcome.into()))
}
