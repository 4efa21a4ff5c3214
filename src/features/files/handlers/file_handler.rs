use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppPath, AppQuery};
use crate::features::auth::model::AuthenticatedUser;
use crate::features::files::dtos::{
    BatchUploadFileDto, BatchUploadResponseDto, DeleteFileResponseDto, FileResponseDto,
    ListFilesQuery, UploadFileDto, UploadMetadataDto,
};
use crate::features::files::models::IncomingFile;
use crate::features::files::services::{FileDownload, FileService, UploadPolicy};
use crate::shared::constants::FALLBACK_CONTENT_TYPE;
use crate::shared::content_disposition;
use crate::shared::types::{ApiResponse, Meta};

/// Parsed multipart upload form
struct UploadForm {
    files: Vec<IncomingFile>,
    metadata: UploadMetadataDto,
}

/// Which upload route a form belongs to
#[derive(Clone, Copy, PartialEq, Eq)]
enum UploadKind {
    Single,
    Batch,
}

impl UploadKind {
    fn file_fields(self) -> &'static [&'static str] {
        match self {
            UploadKind::Single => &["file"],
            UploadKind::Batch => &["files", "files[]"],
        }
    }
}

/// Read every part of an upload form. File parts become files; `category`,
/// `tags` and `description` are collected as metadata.
///
/// A batch is rejected as soon as its file count passes the limit, before the
/// extra part's bytes are read. A single upload only keeps the first file.
async fn read_upload_form(
    mut multipart: Multipart,
    kind: UploadKind,
    policy: &UploadPolicy,
) -> Result<UploadForm> {
    let mut files = Vec::new();
    let mut metadata = UploadMetadataDto::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, kind, policy))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        if kind.file_fields().contains(&field_name.as_str()) {
            match kind {
                UploadKind::Batch => policy.check_batch_size(files.len() + 1)?,
                UploadKind::Single if !files.is_empty() => {
                    debug!("Ignoring extra file part: {}", field_name);
                    continue;
                }
                UploadKind::Single => {}
            }

            let file_name = field.file_name().map(|s| s.to_string());
            let content_type = field.content_type().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| multipart_error(e, kind, policy))?;

            files.push(IncomingFile {
                file_name,
                content_type,
                data,
            });
            continue;
        }

        let slot = match field_name.as_str() {
            "category" => &mut metadata.category,
            "tags" => &mut metadata.tags,
            "description" => &mut metadata.description,
            _ => {
                debug!("Ignoring unknown field: {}", field_name);
                continue;
            }
        };
        let text = field
            .text()
            .await
            .map_err(|e| multipart_error(e, kind, policy))?;
        *slot = Some(text);
    }

    metadata
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    Ok(UploadForm { files, metadata })
}

/// Map a multipart read failure. Hitting the body limit on the single route
/// means the one file is too large; on the batch route it only says the
/// request as a whole is.
fn multipart_error(e: MultipartError, kind: UploadKind, policy: &UploadPolicy) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return match kind {
            // the body was cut off at the limit, so its real size is at least that
            UploadKind::Single => AppError::FileTooLarge {
                size: policy.single_request_limit(),
                max: policy.max_file_size(),
            },
            UploadKind::Batch => AppError::RequestTooLarge {
                limit: policy.batch_request_limit(),
            },
        };
    }
    debug!("Failed to read multipart data: {}", e);
    AppError::BadRequest(format!("Failed to read multipart data: {}", e.body_text()))
}

/// Stream a stored file with its type, length and disposition headers
fn file_response(download: FileDownload) -> Result<Response> {
    let disposition = content_disposition::build(
        download.disposition,
        &download.file_name,
        Utc::now().timestamp_millis(),
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| AppError::Internal(format!("invalid Content-Disposition: {}", e)))?;
    let content_type = HeaderValue::from_str(&download.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));

    let body = Body::from_stream(ReaderStream::new(download.file));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(download.size)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Upload a single file
///
/// Accepts multipart/form-data with:
/// - `file`: the file to upload (required)
/// - `category`, `tags` (comma-separated), `description`: optional metadata
#[utoipa::path(
    post,
    path = "/api/files/upload",
    tag = "files",
    request_body(
        content = UploadFileDto,
        content_type = "multipart/form-data",
        description = "File upload form with optional category, tags and description",
    ),
    responses(
        (status = 201, description = "File uploaded successfully", body = ApiResponse<FileResponseDto>),
        (status = 400, description = "Empty file, missing filename or invalid metadata"),
        (status = 401, description = "Authentication required"),
        (status = 413, description = "File too large"),
        (status = 415, description = "File type not allowed")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_file(
    user: AuthenticatedUser,
    State(service): State<Arc<FileService>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<FileResponseDto>>)> {
    let form = read_upload_form(multipart, UploadKind::Single, service.policy()).await?;

    let file = form.files.into_iter().next().unwrap_or(IncomingFile {
        file_name: None,
        content_type: None,
        data: Bytes::new(),
    });

    let record = service
        .upload_file(user.user_id, file, &form.metadata.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            Some(FileResponseDto::from(record)),
            Some("File uploaded successfully".to_string()),
            None,
        )),
    ))
}

/// Upload several files with shared metadata
///
/// Files are read from the `files` (or `files[]`) parts. Each file succeeds or
/// fails on its own; the request only fails when no file could be stored.
#[utoipa::path(
    post,
    path = "/api/files/upload/batch",
    tag = "files",
    request_body(
        content = BatchUploadFileDto,
        content_type = "multipart/form-data",
    ),
    responses(
        (status = 201, description = "At least one file uploaded", body = ApiResponse<BatchUploadResponseDto>),
        (status = 400, description = "Too many files, or every file failed"),
        (status = 401, description = "Authentication required"),
        (status = 413, description = "Request body too large")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_files(
    user: AuthenticatedUser,
    State(service): State<Arc<FileService>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<BatchUploadResponseDto>>)> {
    let form = read_upload_form(multipart, UploadKind::Batch, service.policy()).await?;

    let outcome = service
        .upload_files(user.user_id, form.files, &form.metadata.into())
        .await?;
    let response = BatchUploadResponseDto::from(outcome);
    let message = response.summary();

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(Some(response), Some(message), None)),
    ))
}

/// List the caller's files, newest first
#[utoipa::path(
    get,
    path = "/api/files/list",
    tag = "files",
    params(ListFilesQuery),
    responses(
        (status = 200, description = "Files retrieved successfully", body = ApiResponse<Vec<FileResponseDto>>),
        (status = 401, description = "Authentication required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_files(
    user: AuthenticatedUser,
    State(service): State<Arc<FileService>>,
    AppQuery(params): AppQuery<ListFilesQuery>,
) -> Result<Json<ApiResponse<Vec<FileResponseDto>>>> {
    let query = params.to_query();
    let (files, total) = service.list_files(user.user_id, &query).await?;

    Ok(Json(ApiResponse::success(
        Some(files.into_iter().map(FileResponseDto::from).collect()),
        None,
        Some(Meta::paged(total, query.page, query.page_size)),
    )))
}

/// Categories used by the caller's files
#[utoipa::path(
    get,
    path = "/api/files/categories",
    tag = "files",
    responses(
        (status = 200, description = "Categories retrieved successfully", body = ApiResponse<Vec<String>>),
        (status = 401, description = "Authentication required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_categories(
    user: AuthenticatedUser,
    State(service): State<Arc<FileService>>,
) -> Result<Json<ApiResponse<Vec<String>>>> {
    let categories = service.list_categories(user.user_id).await?;
    Ok(Json(ApiResponse::success(Some(categories), None, None)))
}

/// Get file metadata
#[utoipa::path(
    get,
    path = "/api/files/{id}",
    tag = "files",
    params(
        ("id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File retrieved successfully", body = ApiResponse<FileResponseDto>),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_file(
    user: AuthenticatedUser,
    State(service): State<Arc<FileService>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<FileResponseDto>>> {
    let file = service.get_file(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(
        Some(FileResponseDto::from(file)),
        None,
        None,
    )))
}

/// Download a file
///
/// Streams the stored bytes as an attachment and counts the download.
#[utoipa::path(
    get,
    path = "/api/files/{id}/download",
    tag = "files",
    params(
        ("id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn download_file(
    user: AuthenticatedUser,
    State(service): State<Arc<FileService>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response> {
    let download = service.prepare_download(user.user_id, id).await?;
    file_response(download)
}

/// Public preview of a file by its URL segments
///
/// No authentication. The stored filename is random, so the URL itself is the
/// only credential. Browser-renderable types are served inline.
#[utoipa::path(
    get,
    path = "/api/files/public/{user_id}/{year}/{month}/{day}/{file_name}",
    tag = "files",
    params(
        ("user_id" = String, Path, description = "Owner ID"),
        ("year" = String, Path, description = "Upload year (yyyy)"),
        ("month" = String, Path, description = "Upload month (MM)"),
        ("day" = String, Path, description = "Upload day (dd)"),
        ("file_name" = String, Path, description = "Stored file name")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 404, description = "File not found")
    )
)]
pub async fn preview_public_file(
    State(service): State<Arc<FileService>>,
    Path((user_id, year, month, day, file_name)): Path<(String, String, String, String, String)>,
) -> Result<Response> {
    let date_path = format!("{}/{}/{}", year, month, day);
    let download = service
        .open_public(&user_id, &date_path, &file_name)
        .await?;
    file_response(download)
}

/// Delete a file
///
/// Removes the stored bytes (best effort) and soft deletes the record.
#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    tag = "files",
    params(
        ("id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File deleted successfully", body = ApiResponse<DeleteFileResponseDto>),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_file(
    user: AuthenticatedUser,
    State(service): State<Arc<FileService>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<DeleteFileResponseDto>>> {
    service.delete_file(user.user_id, id).await?;

    Ok(Json(ApiResponse::success(
        Some(DeleteFileResponseDto { deleted: true }),
        Some("File deleted successfully".to_string()),
        None,
    )))
}
