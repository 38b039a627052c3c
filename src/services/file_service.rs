//! src/services/file_service.rs
//!
//! FileService — the file operations exposed over HTTP, layered on an
//! [`ObjectStore`]. The store is the only source of truth: every call reads
//! live state and nothing is cached here.
//!
//! Existence preconditions (no overwrite on upload, no delete/verify/download
//! of missing objects) are enforced with a stat call followed by the action.
//! The two steps are not atomic: two concurrent uploads of the same new key
//! can both pass the guard, and the later put wins. Closing that window needs
//! conditional writes from the backend, so the check is best-effort.

use crate::{
    models::file::File,
    store::{ListMode, ObjectReader, ObjectStore, StoreError, Tags},
};
use bytes::Bytes;
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use std::{fmt, future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Tag carrying the verification flag.
pub const VERIFIED_TAG: &str = "verified";

#[derive(Debug, Error)]
pub enum FileError {
    #[error("{name} already exists in bucket {bucket}")]
    AlreadyExists { bucket: String, name: String },
    #[error("{name} does not exist in bucket {bucket}")]
    DoesNotExist { bucket: String, name: String },
    #[error("{operation} did not complete within {after:?}")]
    DeadlineExceeded {
        operation: &'static str,
        after: Duration,
    },
    #[error(transparent)]
    Backend(#[from] StoreError),
}

impl FileError {
    fn already_exists(bucket: &str, name: &str) -> Self {
        Self::AlreadyExists {
            bucket: bucket.to_string(),
            name: name.to_string(),
        }
    }

    fn does_not_exist(bucket: &str, name: &str) -> Self {
        Self::DoesNotExist {
            bucket: bucket.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_does_not_exist(&self) -> bool {
        matches!(self, Self::DoesNotExist { .. })
    }
}

pub type FileResult<T> = Result<T, FileError>;

/// Why the verification tag could not be read. Never returned to callers:
/// the file is reported as unverified and the warning is logged.
#[derive(Debug, Error)]
pub enum TagParseWarning {
    #[error("unable to fetch tags: {0}")]
    Fetch(#[from] FileError),
    #[error("`verified` tag is missing")]
    Missing,
    #[error("unable to parse verified tag `{0}`")]
    Invalid(String),
}

/// An open download: the payload stream plus the metadata needed to serve it.
pub struct FileDownload {
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub body: ObjectReader,
}

impl fmt::Debug for FileDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDownload")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// FileService provides the file operations:
/// - Get / GetAll (read-through projections with the verification flag)
/// - Upload (refuses to overwrite, tags new objects as unverified)
/// - Delete (returns the pre-delete snapshot)
/// - Verify / Unverify (flip the verification tag)
/// - Download (streams the payload)
///
/// Cloning is cheap; clones share the same store client.
#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn ObjectStore>,

    /// Deadline for each individual store call.
    request_timeout: Duration,
}

impl FileService {
    pub fn new(store: Arc<dyn ObjectStore>, request_timeout: Duration) -> Self {
        Self {
            store,
            request_timeout,
        }
    }

    /// Bound a store call by the request deadline.
    async fn deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = T>,
    ) -> FileResult<T> {
        timeout(self.request_timeout, fut)
            .await
            .map_err(|_| FileError::DeadlineExceeded {
                operation,
                after: self.request_timeout,
            })
    }

    /// Existence guard: a metadata-only stat.
    ///
    /// Any stat failure (including transport errors and deadlines) reads as
    /// "absent"; failures other than a plain miss are logged.
    pub async fn exists(&self, bucket: &str, name: &str) -> bool {
        let err = match self
            .deadline("stat_object", self.store.stat_object(bucket, name))
            .await
        {
            Ok(Ok(_)) => return true,
            Ok(Err(err)) if err.is_not_found() => return false,
            Ok(Err(err)) => FileError::Backend(err),
            Err(err) => err,
        };
        warn!(bucket, name, error = %err, "existence check failed, treating as absent");
        false
    }

    /// Round-trip to the store, used by the readiness check.
    pub async fn ping(&self) -> FileResult<()> {
        self.deadline("health_check", self.store.health_check())
            .await??;
        Ok(())
    }

    /// Fetch a single file. A missing object yields [`FileError::DoesNotExist`].
    pub async fn get(&self, bucket: &str, name: &str) -> FileResult<File> {
        let info = self
            .deadline("stat_object", self.store.stat_object(bucket, name))
            .await?
            .map_err(|err| match err {
                StoreError::NotFound { .. } => FileError::does_not_exist(bucket, name),
                other => FileError::Backend(other),
            })?;

        let mut file = File::from_object(bucket, info);
        self.enhance(&mut file).await;
        Ok(file)
    }

    /// Lazily stream every file in a bucket.
    ///
    /// The stream yields an error and then ends as soon as the listing fails.
    pub fn files<'a>(&'a self, bucket: &'a str, mode: ListMode) -> BoxStream<'a, FileResult<File>> {
        let listing = self.store.list_objects(bucket, mode);
        stream::unfold(Some(listing), move |listing| async move {
            let mut listing = listing?;
            match self.deadline("list_objects", listing.next()).await {
                Ok(None) => None,
                Ok(Some(Ok(info))) => {
                    let mut file = File::from_object(bucket, info);
                    self.enhance(&mut file).await;
                    Some((Ok(file), Some(listing)))
                }
                Ok(Some(Err(err))) => Some((Err(FileError::Backend(err)), None)),
                Err(err) => Some((Err(err), None)),
            }
        })
        .boxed()
    }

    /// Collect every file in a bucket, failing on the first listing error.
    pub async fn get_all(&self, bucket: &str, mode: ListMode) -> FileResult<Vec<File>> {
        let files: Vec<File> = self.files(bucket, mode).try_collect().await?;
        debug!(bucket, count = files.len(), "listed files");
        Ok(files)
    }

    /// Upload a new file, tagged as unverified.
    ///
    /// The tag travels with the put request, so the object is never visible
    /// without it.
    pub async fn upload(
        &self,
        bucket: &str,
        name: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> FileResult<File> {
        if self.exists(bucket, name).await {
            return Err(FileError::already_exists(bucket, name));
        }

        let size = content.len();
        let tags = Tags::from([(VERIFIED_TAG.to_string(), false.to_string())]);
        self.deadline(
            "put_object",
            self.store
                .put_object(bucket, name, content, content_type, &tags),
        )
        .await??;
        info!(bucket, name, size, "uploaded file");

        self.get(bucket, name).await
    }

    /// Delete a file, returning the record as it was before removal.
    ///
    /// If the removal fails after the snapshot was taken, the error wins and
    /// the snapshot is dropped.
    pub async fn delete(&self, bucket: &str, name: &str) -> FileResult<File> {
        if !self.exists(bucket, name).await {
            return Err(FileError::does_not_exist(bucket, name));
        }

        let snapshot = self.get(bucket, name).await?;
        self.deadline("remove_object", self.store.remove_object(bucket, name))
            .await??;
        info!(bucket, name, "deleted file");
        Ok(snapshot)
    }

    pub async fn verify(&self, bucket: &str, name: &str) -> FileResult<File> {
        self.set_verified(bucket, name, true).await
    }

    pub async fn unverify(&self, bucket: &str, name: &str) -> FileResult<File> {
        self.set_verified(bucket, name, false).await
    }

    /// Write the verification tag, keeping any other tags on the object.
    async fn set_verified(&self, bucket: &str, name: &str, verified: bool) -> FileResult<File> {
        if !self.exists(bucket, name).await {
            return Err(FileError::does_not_exist(bucket, name));
        }

        let mut tags = self
            .deadline("get_object_tags", self.store.get_object_tags(bucket, name))
            .await?
            .map_err(|err| gone_after_guard(bucket, name, err))?;
        tags.insert(VERIFIED_TAG.to_string(), verified.to_string());
        self.deadline(
            "set_object_tags",
            self.store.set_object_tags(bucket, name, &tags),
        )
        .await?
        .map_err(|err| gone_after_guard(bucket, name, err))?;
        info!(bucket, name, verified, "updated verification tag");

        self.get(bucket, name).await
    }

    /// Open a file for streaming. The caller owns the returned body.
    pub async fn download(&self, bucket: &str, name: &str) -> FileResult<FileDownload> {
        if !self.exists(bucket, name).await {
            return Err(FileError::does_not_exist(bucket, name));
        }

        let (info, body) = self
            .deadline("get_object", self.store.get_object(bucket, name))
            .await?
            .map_err(|err| gone_after_guard(bucket, name, err))?;

        Ok(FileDownload {
            name: info.key,
            size: info.size,
            content_type: info.content_type,
            body,
        })
    }

    /// Fill in `verified` from the object's tags. Failures leave it `false`.
    async fn enhance(&self, file: &mut File) {
        match self.read_verified(&file.bucket, &file.name).await {
            Ok(verified) => file.verified = verified,
            Err(warning) => warn!(
                bucket = %file.bucket,
                name = %file.name,
                error = %warning,
                "unable to enhance file with verification tag"
            ),
        }
    }

    async fn read_verified(&self, bucket: &str, name: &str) -> Result<bool, TagParseWarning> {
        let tags = self
            .deadline("get_object_tags", self.store.get_object_tags(bucket, name))
            .await?
            .map_err(FileError::Backend)?;
        let value = tags.get(VERIFIED_TAG).ok_or(TagParseWarning::Missing)?;
        parse_flag(value).ok_or_else(|| TagParseWarning::Invalid(value.clone()))
    }
}

/// The guard saw the object but a later call did not: another client removed
/// it in between.
fn gone_after_guard(bucket: &str, name: &str, err: StoreError) -> FileError {
    match err {
        StoreError::NotFound { .. } => FileError::does_not_exist(bucket, name),
        other => FileError::Backend(other),
    }
}

/// Accepts the usual spellings of a boolean flag: `1/0`, `t/f`, `true/false`
/// in lower, upper, or title case.
fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
