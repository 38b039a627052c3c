//! Object store client abstraction.
//!
//! The file operations in `services::file_service` only talk to the backing
//! store through [`ObjectStore`]. Production runs against any S3-compatible
//! endpoint (MinIO, AWS) through [`s3::S3Store`]; tests use the in-memory store.

#[cfg(test)]
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{collections::BTreeMap, pin::Pin};
use thiserror::Error;
use tokio::io::AsyncRead;

/// Object-level key/value tags as stored by the backend.
pub type Tags = BTreeMap<String, String>;

/// Streaming handle over an object's payload. Dropping it releases the
/// underlying connection.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Metadata the store reports for a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key within its bucket.
    pub key: String,

    /// Payload size in bytes.
    pub size: u64,

    /// MIME type, when the store reports one. Listings never carry it.
    pub content_type: Option<String>,
}

/// How far a bucket listing descends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMode {
    /// Every key in the bucket, nested paths included, as flat entries.
    #[default]
    Recursive,
    /// Only keys without a `/`; nested "directories" are folded away and skipped.
    TopLevel,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("{operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Typed surface over the backing object store.
///
/// Every method issues exactly one logical request; nothing here retries.
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata-only lookup. Absent objects yield [`StoreError::NotFound`].
    async fn stat_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectInfo>;

    /// Open an object for streaming reads.
    async fn get_object(&self, bucket: &str, key: &str)
    -> StoreResult<(ObjectInfo, ObjectReader)>;

    /// Store `content` under `key`, attaching `tags` in the same request.
    /// Overwrites silently; existence checks belong to the caller.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        content_type: Option<&str>,
        tags: &Tags,
    ) -> StoreResult<()>;

    async fn remove_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Lazily list a bucket. The stream ends after the first error.
    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        mode: ListMode,
    ) -> BoxStream<'a, StoreResult<ObjectInfo>>;

    async fn get_object_tags(&self, bucket: &str, key: &str) -> StoreResult<Tags>;

    /// Replace the object's whole tag set with `tags`.
    async fn set_object_tags(&self, bucket: &str, key: &str, tags: &Tags) -> StoreResult<()>;

    /// Cheap round-trip proving the endpoint is reachable and the credentials work.
    async fn health_check(&self) -> StoreResult<()>;
}
