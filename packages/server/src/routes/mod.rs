mod v1;

use axum::extract::DefaultBodyLimit;
use utoipa_axum::router::OpenApiRouter;

use crate::config::AppConfig;
use crate::state::AppState;

/// Multipart framing allowance on top of the upload cap.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn api_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let body_limit = config
        .storage
        .max_upload_size
        .saturating_add(MULTIPART_OVERHEAD);

    OpenApiRouter::new()
        .nest("/v1", v1::routes())
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
}
