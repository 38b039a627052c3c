//! In-memory [`ObjectStore`] used by the test suites.
//!
//! Buckets must be registered up front, mirroring a real store where buckets
//! are provisioned out of band. A few switches inject the failures the file
//! operations have to tolerate or propagate.

use crate::store::{ListMode, ObjectInfo, ObjectReader, ObjectStore, StoreError, StoreResult, Tags};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    io::Cursor,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    tags: Tags,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    buckets: RwLock<BTreeSet<String>>,
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
    fail_tag_reads: AtomicBool,
    fail_puts: AtomicBool,
    fail_removes: AtomicBool,
    fail_health_check: AtomicBool,
    /// Drop an object right after a successful stat, as if another client
    /// deleted it in between.
    remove_after_stat: AtomicBool,
    /// Number of entries a listing yields before failing; `None` encoded as `usize::MAX`.
    fail_listing_after: AtomicUsize,
    latency_ms: AtomicU64,
    puts: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            fail_listing_after: AtomicUsize::new(usize::MAX),
            ..Self::default()
        }
    }

    pub async fn with_bucket(self, bucket: &str) -> Self {
        self.buckets.write().await.insert(bucket.to_string());
        self
    }

    /// Store an object bypassing the tag header, like a file dropped into the
    /// bucket by another client.
    pub async fn insert_raw(&self, bucket: &str, key: &str, data: &'static [u8], tags: Tags) {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: Bytes::from_static(data),
                content_type: None,
                tags,
            },
        );
    }

    pub async fn tags_of(&self, bucket: &str, key: &str) -> Option<Tags> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .map(|obj| obj.tags.clone())
    }

    pub async fn object_count(&self, bucket: &str) -> usize {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(b, _)| b == bucket)
            .count()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn fail_tag_reads(&self, fail: bool) {
        self.fail_tag_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn remove_after_stat(&self, remove: bool) {
        self.remove_after_stat.store(remove, Ordering::SeqCst);
    }

    pub fn fail_health_check(&self, fail: bool) {
        self.fail_health_check.store(fail, Ordering::SeqCst);
    }

    pub fn fail_listing_after(&self, entries: usize) {
        self.fail_listing_after.store(entries, Ordering::SeqCst);
    }

    /// Delay applied before every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn ensure_bucket(&self, operation: &'static str, bucket: &str) -> StoreResult<()> {
        if self.buckets.read().await.contains(bucket) {
            Ok(())
        } else {
            Err(StoreError::backend(
                operation,
                format!("NoSuchBucket: bucket `{bucket}` does not exist"),
            ))
        }
    }

    async fn lookup(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn stat_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectInfo> {
        self.simulate_latency().await;
        self.ensure_bucket("head_object", bucket).await?;
        let obj = self.lookup(bucket, key).await?;
        if self.remove_after_stat.load(Ordering::SeqCst) {
            self.objects
                .write()
                .await
                .remove(&(bucket.to_string(), key.to_string()));
        }
        Ok(ObjectInfo {
            key: key.to_string(),
            size: obj.data.len() as u64,
            content_type: obj.content_type,
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> StoreResult<(ObjectInfo, ObjectReader)> {
        self.simulate_latency().await;
        self.ensure_bucket("get_object", bucket).await?;
        let obj = self.lookup(bucket, key).await?;
        let info = ObjectInfo {
            key: key.to_string(),
            size: obj.data.len() as u64,
            content_type: obj.content_type,
        };
        let reader: ObjectReader = Box::pin(Cursor::new(obj.data));
        Ok((info, reader))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        content_type: Option<&str>,
        tags: &Tags,
    ) -> StoreResult<()> {
        self.simulate_latency().await;
        self.ensure_bucket("put_object", bucket).await?;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::backend("put_object", "SlowDown: reduce request rate"));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: content,
                content_type: content_type.map(str::to_string),
                tags: tags.clone(),
            },
        );
        Ok(())
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.simulate_latency().await;
        self.ensure_bucket("delete_object", bucket).await?;
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::backend(
                "delete_object",
                "AccessDenied: deletes are not permitted",
            ));
        }
        // S3 deletes are idempotent.
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        mode: ListMode,
    ) -> BoxStream<'a, StoreResult<ObjectInfo>> {
        stream::once(async move {
            self.simulate_latency().await;
            if let Err(err) = self.ensure_bucket("list_objects_v2", bucket).await {
                return vec![Err(err)];
            }

            let fail_after = self.fail_listing_after.load(Ordering::SeqCst);
            let objects = self.objects.read().await;
            let mut entries: Vec<StoreResult<ObjectInfo>> = objects
                .iter()
                .filter(|((b, k), _)| {
                    b == bucket && (mode == ListMode::Recursive || !k.contains('/'))
                })
                .map(|((_, k), obj)| {
                    Ok(ObjectInfo {
                        key: k.clone(),
                        size: obj.data.len() as u64,
                        content_type: None,
                    })
                })
                .take(fail_after)
                .collect();
            if fail_after != usize::MAX {
                entries.push(Err(StoreError::backend(
                    "list_objects_v2",
                    "connection reset while listing",
                )));
            }
            entries
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn get_object_tags(&self, bucket: &str, key: &str) -> StoreResult<Tags> {
        self.simulate_latency().await;
        if self.fail_tag_reads.load(Ordering::SeqCst) {
            return Err(StoreError::backend(
                "get_object_tagging",
                "AccessDenied: tag reads are not permitted",
            ));
        }
        self.ensure_bucket("get_object_tagging", bucket).await?;
        Ok(self.lookup(bucket, key).await?.tags)
    }

    async fn set_object_tags(&self, bucket: &str, key: &str, tags: &Tags) -> StoreResult<()> {
        self.simulate_latency().await;
        self.ensure_bucket("put_object_tagging", bucket).await?;
        let mut objects = self.objects.write().await;
        let obj = objects
            .get_mut(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| StoreError::not_found(bucket, key))?;
        obj.tags = tags.clone();
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.simulate_latency().await;
        if self.fail_health_check.load(Ordering::SeqCst) {
            return Err(StoreError::backend("list_buckets", "connection refused"));
        }
        Ok(())
    }
}
