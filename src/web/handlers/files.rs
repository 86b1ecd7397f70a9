//! File API handlers: listing, upload, download and delete.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, Path, Request, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::{wants_html, with_service, AppState};
use crate::storage::{DeletedKind, PendingUpload, UploadFailure, UploadReport};
use crate::web::dto::{FileInfoResponse, MessageResponse, UploadResponse};
use crate::web::error::ApiError;
use crate::FiledropError;

/// Build an inline Content-Disposition header value.
///
/// Uses RFC 5987 encoding (`filename*=UTF-8''...`) for non-ASCII filenames
/// and a sanitized ASCII fallback for the plain `filename` parameter.
fn content_disposition_header(filename: &str) -> String {
    let plain = filename.is_ascii()
        && !filename
            .chars()
            .any(|c| c.is_control() || c == '"' || c == '\\');
    if plain {
        return format!("inline; filename=\"{filename}\"");
    }

    let fallback: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if !c.is_ascii() => '_',
            c => c,
        })
        .collect();
    let encoded = urlencoding::encode(filename);

    format!("inline; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

/// GET /api/files - List every file and directory, newest uploads first.
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    responses(
        (status = 200, description = "Files and directories", body = Vec<FileInfoResponse>),
        (status = 500, description = "Upload root could not be read")
    )
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FileInfoResponse>>, ApiError> {
    let entries = with_service(&state, |service| service.list()).await??;
    Ok(Json(entries.iter().map(FileInfoResponse::from).collect()))
}

/// POST / - Upload one or more files.
///
/// Request body: multipart/form-data with one or more `file` fields. The part's
/// file name may contain `/` to upload into subdirectories.
#[utoipa::path(
    post,
    path = "/",
    tag = "files",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "Repeated `file` parts"
    ),
    responses(
        (status = 200, description = "All files uploaded", body = UploadResponse),
        (status = 303, description = "Uploaded; browser redirected to the listing"),
        (status = 400, description = "No file part, empty selection, or invalid names", body = UploadResponse),
        (status = 413, description = "Request body too large"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 500, description = "A file could not be written", body = UploadResponse)
    )
)]
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Rejected upload body: {}", e);
        ApiError::bad_request("No file part")
    })?;

    let mut report = UploadReport::default();
    let mut saw_file_part = false;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Failed to read multipart field: {}", e);
        multipart_error(&e, "Invalid multipart data")
    })? {
        if field.name() != Some("file") {
            continue;
        }
        saw_file_part = true;

        let name = field.file_name().unwrap_or_default().to_string();
        if name.trim().is_empty() {
            report.skipped += 1;
            continue;
        }

        let requested = name.clone();
        let pending =
            match with_service(&state, move |service| service.begin_upload(&requested)).await? {
                Ok(pending) => pending,
                Err(error) => {
                    record_failure(&mut report, name, error);
                    continue;
                }
            };

        match write_field(&mut field, &pending).await {
            Ok(()) => {}
            Err(FieldWriteError::Body(e)) => {
                tracing::warn!(name = %name, "Failed to read file content: {}", e);
                return Err(multipart_error(&e, "Failed to read file"));
            }
            Err(FieldWriteError::Io(e)) => {
                let error = FiledropError::file(pending.rel(), e);
                record_failure(&mut report, name, error);
                continue;
            }
        }

        match with_service(&state, move |service| service.finish_upload(pending)).await? {
            Ok(path) => report.uploaded.push(path),
            Err(error) => record_failure(&mut report, name, error),
        }
    }

    if !saw_file_part {
        return Err(ApiError::bad_request("No file part"));
    }

    if report.uploaded.is_empty() && report.failed.is_empty() {
        return Err(ApiError::bad_request("No selected file"));
    }

    if report.is_complete() {
        if wants_html(&headers) {
            return Ok(Redirect::to("/").into_response());
        }
        return Ok(Json(UploadResponse::from(report)).into_response());
    }

    let status = if report.has_server_failure() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(UploadResponse::from(report))).into_response())
}

enum FieldWriteError {
    /// The request body failed or exceeded the limit.
    Body(MultipartError),
    /// The partial file could not be written.
    Io(std::io::Error),
}

/// Stream one file part into the partial file of `pending`.
async fn write_field(
    field: &mut Field<'_>,
    pending: &PendingUpload,
) -> Result<(), FieldWriteError> {
    let mut file = tokio::fs::File::create(pending.partial_path())
        .await
        .map_err(FieldWriteError::Io)?;
    while let Some(chunk) = field.chunk().await.map_err(FieldWriteError::Body)? {
        file.write_all(&chunk).await.map_err(FieldWriteError::Io)?;
    }
    file.flush().await.map_err(FieldWriteError::Io)?;
    Ok(())
}

fn multipart_error(e: &MultipartError, message: &str) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Request body too large")
    } else {
        ApiError::bad_request(message)
    }
}

fn record_failure(report: &mut UploadReport, name: String, error: FiledropError) {
    tracing::warn!(name = %name, error = %error, "Upload failed");
    report.failed.push(UploadFailure { name, error });
}

/// GET /uploads/{path} - Stream a stored file inline.
#[utoipa::path(
    get,
    path = "/uploads/{path}",
    tag = "files",
    params(
        ("path" = String, Path, description = "Path relative to the upload root")
    ),
    responses(
        (status = 200, description = "File content, displayed inline"),
        (status = 400, description = "Invalid path"),
        (status = 404, description = "File not found")
    )
)]
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    req: Request,
) -> Result<Response, ApiError> {
    let served = with_service(&state, move |service| service.resolve_for_serving(&path)).await??;

    let response = match ServeFile::new_with_mime(&served.path, &served.content_type)
        .oneshot(req)
        .await
    {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);

    if response.status().is_success() {
        let disposition = content_disposition_header(&served.file_name);
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            response
                .headers_mut()
                .insert(header::CONTENT_DISPOSITION, value);
        }
    }

    Ok(response)
}

/// POST /delete/{path} - Delete a file or directory.
#[utoipa::path(
    post,
    path = "/delete/{path}",
    tag = "files",
    params(
        ("path" = String, Path, description = "Path relative to the upload root")
    ),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 303, description = "Deleted; browser redirected to the listing"),
        (status = 400, description = "Invalid path"),
        (status = 404, description = "Not found"),
        (status = 429, description = "Rate limit exceeded")
    )
)]
pub async fn delete_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = path.clone();
    let kind = with_service(&state, move |service| service.delete(&target)).await??;

    if wants_html(&headers) {
        return Ok(Redirect::to("/").into_response());
    }

    let message = match kind {
        DeletedKind::File => format!("File {path} deleted successfully"),
        DeletedKind::Directory => format!("Directory {path} deleted successfully"),
    };
    Ok(Json(MessageResponse::new(message)).into_response())
}
