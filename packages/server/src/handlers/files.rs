use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::instrument;

use crate::catalog::SortKey;
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::extractors::query::AppQuery;
use crate::models::file::{
    BulkDeleteRequest, BulkDeleteResponse, DeleteResponse, DuplicateListParams,
    FileListParams, FileListResponse, FileResponse, FileTypesResponse, UploadResponse,
};
use crate::models::shared::parse_file_id;
use crate::services::UploadRequest;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/files",
    tag = "Files",
    operation_id = "uploadFile",
    summary = "Upload a file",
    description = "Uploads the `file` multipart field. Identical content already in the catalog \
        is not stored again; the new file shares it and `is_duplicate` is set. An optional \
        `size` field sent before `file` is checked against the upload limit up front.",
    request_body(content_type = "multipart/form-data", description = "File upload"),
    responses(
        (status = 201, description = "File recorded", body = UploadResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "Content is being created concurrently (CONFLICT)", body = ErrorBody),
        (status = 500, description = "Storage failure (STORAGE_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, multipart))]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut declared_size: Option<u64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("size") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read size: {e}")))?;
                declared_size = Some(text.trim().parse().map_err(|_| {
                    AppError::Validation(format!("Invalid size: {text}"))
                })?);
            }
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
                let declared_type = field.content_type().map(str::to_string);
                let reader = StreamReader::new(Box::pin(field.map_err(std::io::Error::other)));

                let outcome = state
                    .dedup
                    .upload(
                        reader,
                        UploadRequest {
                            filename,
                            declared_type,
                            declared_size,
                        },
                        state.config.storage.max_upload_size,
                    )
                    .await?;

                return Ok((StatusCode::CREATED, Json(UploadResponse::from(outcome))));
            }
            _ => {} // Ignore unknown fields.
        }
    }

    Err(AppError::Validation("Missing 'file' field".into()))
}

#[utoipa::path(
    get,
    path = "/files",
    tag = "Files",
    operation_id = "listFiles",
    summary = "List files",
    description = "Paginated file list. Accepts the same filters as the search endpoint.",
    params(FileListParams),
    responses(
        (status = 200, description = "File list", body = FileListResponse),
        (status = 400, description = "Malformed filter (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn list_files(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<FileListParams>,
) -> Result<Json<FileListResponse>, AppError> {
    run_query(&state, &params).await
}

#[utoipa::path(
    get,
    path = "/files/search",
    tag = "Files",
    operation_id = "searchFiles",
    summary = "Search files",
    description = "Filter by filename substring, media types, size range, upload window and \
        duplicate status; sort by `uploaded_at`, `original_filename`, `size` or `file_type` \
        (prefix `-` for descending).",
    params(FileListParams),
    responses(
        (status = 200, description = "Matching files", body = FileListResponse),
        (status = 400, description = "Malformed filter (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn search_files(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<FileListParams>,
) -> Result<Json<FileListResponse>, AppError> {
    run_query(&state, &params).await
}

async fn run_query(
    state: &AppState,
    params: &FileListParams,
) -> Result<Json<FileListResponse>, AppError> {
    let sort = SortKey::parse_or_default(params.sort_by.as_deref())?;
    let page = state
        .search()
        .query(&params.filter(), sort, params.page, params.page_size)
        .await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    get,
    path = "/files/file-types",
    tag = "Files",
    operation_id = "listFileTypes",
    summary = "List media types in use",
    responses(
        (status = 200, description = "Distinct media types, sorted", body = FileTypesResponse),
    ),
)]
#[instrument(skip(state))]
pub async fn list_file_types(
    State(state): State<AppState>,
) -> Result<Json<FileTypesResponse>, AppError> {
    let file_types = state.search().file_types().await?;
    Ok(Json(FileTypesResponse { file_types }))
}

#[utoipa::path(
    get,
    path = "/files/duplicates",
    tag = "Files",
    operation_id = "listDuplicates",
    summary = "List files with shared content",
    description = "Files whose content is referenced by more than one upload.",
    params(DuplicateListParams),
    responses(
        (status = 200, description = "Files with shared content", body = FileListResponse),
        (status = 400, description = "Malformed parameters (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn list_duplicates(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<DuplicateListParams>,
) -> Result<Json<FileListResponse>, AppError> {
    let sort = SortKey::parse_or_default(params.sort_by.as_deref())?;
    let page = state
        .search()
        .duplicates(sort, params.page, params.page_size)
        .await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    get,
    path = "/files/{id}",
    tag = "Files",
    operation_id = "getFile",
    summary = "Get a file",
    params(("id" = String, Path, description = "File ID (UUID)")),
    responses(
        (status = 200, description = "File details", body = FileResponse),
        (status = 400, description = "Invalid ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, AppError> {
    let id = parse_file_id(&id)?;
    let record = state.search().get(id).await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    delete,
    path = "/files/{id}",
    tag = "Files",
    operation_id = "deleteFile",
    summary = "Delete a file",
    description = "Removes the file. Its content is freed once no other file shares it.",
    params(("id" = String, Path, description = "File ID (UUID)")),
    responses(
        (status = 200, description = "File deleted", body = DeleteResponse),
        (status = 400, description = "Invalid ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let id = parse_file_id(&id)?;
    let outcome = state.dedup.delete(id).await?;
    Ok(Json(DeleteResponse::new(id, outcome)))
}

#[utoipa::path(
    post,
    path = "/files/bulk-delete",
    tag = "Files",
    operation_id = "bulkDeleteFiles",
    summary = "Delete several files",
    description = "Each id is deleted independently; failures are reported per id and do not \
        stop the batch. An unparsable id rejects the whole request.",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Per-id results", body = BulkDeleteResponse),
        (status = 400, description = "Empty, oversized or malformed id list (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn bulk_delete_files(
    State(state): State<AppState>,
    AppJson(payload): AppJson<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, AppError> {
    let ids = payload
        .ids
        .iter()
        .map(|raw| parse_file_id(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = state.dedup.bulk_delete(&ids).await?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    get,
    path = "/files/{id}/content",
    tag = "Files",
    operation_id = "downloadFile",
    summary = "Download file content",
    description = "Streams the content. Supports ETag-based caching via If-None-Match.",
    params(("id" = String, Path, description = "File ID (UUID)")),
    responses(
        (status = 200, description = "File content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers))]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = parse_file_id(&id)?;
    let (record, reader) = state.dedup.open(id).await?;
    let reference = record.reference;

    let etag_value = format!("\"{}\"", reference.content_hash);
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && (val == etag_value || val == "*")
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let body = Body::from_stream(ReaderStream::new(reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &reference.file_type)
        .header(header::CONTENT_LENGTH, reference.size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&reference.original_filename),
        )
        .header(header::ETAG, &etag_value)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

/// Build a safe `Content-Disposition` header value.
fn content_disposition_value(filename: &str) -> String {
    let ascii_safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii_name = if ascii_safe.is_empty() {
        "download".to_string()
    } else {
        ascii_safe
    };

    // RFC 5987 percent-encoding for filename*.
    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => String::from(b as char),
            _ => format!("%{b:02X}"),
        })
        .collect();

    format!("attachment; filename=\"{ascii_name}\"; filename*=UTF-8''{encoded}")
}
