//! Defines routes for the file management API.
//!
//! ## Structure
//! - **Health** (mounted at root)
//!   - `GET /healthcheck` — liveness
//!   - `GET /readyz` — object store reachability
//!
//! - **Files** (under `/files/api/v1`)
//!   - `GET    /{bucket}` — list every file (`?recursive=false` keeps top-level keys only)
//!   - `POST   /{bucket}` — upload multipart field `file`
//!   - `GET    /{bucket}/{file}` — file metadata
//!   - `DELETE /{bucket}/{file}` — delete file
//!   - `GET    /download/{bucket}/{file}` — raw file contents
//!   - `GET    /verify/{bucket}/{file}` — mark verified
//!   - `GET    /unverify/{bucket}/{file}` — mark unverified

use crate::{
    handlers::{
        file_handlers::{
            delete_file, download_file, get_file, list_files, unverify_file, upload_file,
            verify_file,
        },
        health_handlers::{healthcheck, readyz},
    },
    services::file_service::FileService,
};
use axum::{Router, routing::get};

/// Build and return the router for the whole API.
///
/// The router carries shared state (`FileService`) to all handlers.
pub fn routes() -> Router<FileService> {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/readyz", get(readyz))
        .nest("/files/api/v1", file_routes())
}

fn file_routes() -> Router<FileService> {
    Router::new()
        .route("/{bucket}", get(list_files).post(upload_file))
        .route("/{bucket}/{file}", get(get_file).delete(delete_file))
        .route("/download/{bucket}/{file}", get(download_file))
        .route("/verify/{bucket}/{file}", get(verify_file))
        .route("/unverify/{bucket}/{file}", get(unverify_file))
}
