use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers::{files, stats};
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(file_routes())
        .merge(stats_routes())
}

fn file_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(files::list_files, files::upload_file))
        .routes(routes!(files::search_files))
        .routes(routes!(files::list_file_types))
        .routes(routes!(files::list_duplicates))
        .routes(routes!(files::bulk_delete_files))
        .routes(routes!(files::get_file, files::delete_file))
        .routes(routes!(files::download_file))
}

fn stats_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(stats::get_stats))
        .routes(routes!(stats::get_detailed_stats))
        .routes(routes!(stats::get_orphans))
        .routes(routes!(stats::collect_orphans))
}
