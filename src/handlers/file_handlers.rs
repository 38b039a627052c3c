//! HTTP handlers for file operations.
//! Downloads stream the object body without buffering it; all storage
//! concerns are delegated to `FileService`.

use crate::{
    errors::AppError,
    models::file::File,
    services::file_service::{FileDownload, FileService},
    store::ListMode,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

/// Multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "file";

/// Query params accepted when listing a bucket.
#[derive(Debug, Default, Deserialize)]
pub struct ListFilesQuery {
    /// `false` skips keys nested under `/`-separated prefixes. Absent means
    /// every key is listed.
    #[serde(default)]
    pub recursive: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
    pub file: File,
}

/// GET `/{bucket}` — list files in a bucket.
pub async fn list_files(
    State(service): State<FileService>,
    Path(bucket): Path<String>,
    Query(q): Query<ListFilesQuery>,
) -> Result<Json<Vec<File>>, AppError> {
    let mode = match q.recursive {
        Some(false) => ListMode::TopLevel,
        _ => ListMode::Recursive,
    };
    Ok(Json(service.get_all(&bucket, mode).await?))
}

/// GET `/{bucket}/{file}` — file metadata and verification state.
pub async fn get_file(
    State(service): State<FileService>,
    Path((bucket, file)): Path<(String, String)>,
) -> Result<Json<File>, AppError> {
    Ok(Json(service.get(&bucket, &file).await?))
}

/// POST `/{bucket}` — upload the multipart field `file` under its file name.
pub async fn upload_file(
    State(service): State<FileService>,
    Path(bucket): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<File>, AppError> {
    let (name, content_type, content) = read_upload(&mut multipart).await?;
    let file = service
        .upload(&bucket, &name, content, content_type.as_deref())
        .await?;
    Ok(Json(file))
}

/// DELETE `/{bucket}/{file}` — delete and echo the removed file.
pub async fn delete_file(
    State(service): State<FileService>,
    Path((bucket, file)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>, AppError> {
    let file = service.delete(&bucket, &file).await?;
    Ok(Json(DeleteResponse {
        message: "file deleted",
        file,
    }))
}

/// GET `/verify/{bucket}/{file}`
pub async fn verify_file(
    State(service): State<FileService>,
    Path((bucket, file)): Path<(String, String)>,
) -> Result<Json<File>, AppError> {
    Ok(Json(service.verify(&bucket, &file).await?))
}

/// GET `/unverify/{bucket}/{file}`
pub async fn unverify_file(
    State(service): State<FileService>,
    Path((bucket, file)): Path<(String, String)>,
) -> Result<Json<File>, AppError> {
    Ok(Json(service.unverify(&bucket, &file).await?))
}

/// GET `/download/{bucket}/{file}` — stream the raw object body.
pub async fn download_file(
    State(service): State<FileService>,
    Path((bucket, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let download = service.download(&bucket, &file).await?;
    let mut response = Response::new(Body::empty());
    set_download_headers(response.headers_mut(), &download);
    *response.body_mut() = Body::from_stream(ReaderStream::new(download.body));
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// Pull the first `file` field out of the form: (file name, content type, bytes).
async fn read_upload(
    multipart: &mut Multipart,
) -> Result<(String, Option<String>, Bytes), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("multipart field `file` has no file name"))?;
        let content_type = field
            .content_type()
            .filter(|ct| !ct.is_empty())
            .map(str::to_string);
        let content = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?;
        return Ok((name, content_type, content));
    }

    Err(AppError::bad_request("missing multipart field `file`"))
}

fn set_download_headers(headers: &mut HeaderMap, download: &FileDownload) {
    let content_type = download
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(download.size));
}
