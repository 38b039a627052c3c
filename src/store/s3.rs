//! S3 protocol adapter for [`ObjectStore`], built on `aws-sdk-s3`.
//!
//! Talks to MinIO or any other S3-compatible endpoint using path-style
//! addressing and static credentials taken from [`StorageConfig`].

use crate::{
    config::StorageConfig,
    store::{ListMode, ObjectInfo, ObjectReader, ObjectStore, StoreError, StoreResult, Tags},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, http::HttpResponse},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{Tag, Tagging},
};
use bytes::Bytes;
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use tracing::debug;

/// Delimiter S3 uses to fold nested keys into common prefixes.
const PATH_DELIMITER: &str = "/";

pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Build a client for the configured endpoint. No request is sent here;
    /// reachability is proven separately through [`ObjectStore::health_check`].
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "static",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn stat_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectInfo> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify("head_object", bucket, key, err))?;

        Ok(ObjectInfo {
            key: key.to_string(),
            size: content_length(output.content_length()),
            content_type: non_empty(output.content_type()),
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> StoreResult<(ObjectInfo, ObjectReader)> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify("get_object", bucket, key, err))?;

        let info = ObjectInfo {
            key: key.to_string(),
            size: content_length(output.content_length()),
            content_type: non_empty(output.content_type()),
        };
        let reader: ObjectReader = Box::pin(output.body.into_async_read());
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
        let size = content.len();
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(content))
            .set_content_type(content_type.map(str::to_string));
        if !tags.is_empty() {
            request = request.tagging(tagging_header(tags)?);
        }

        request
            .send()
            .await
            .map_err(|err| classify("put_object", bucket, key, err))?;
        debug!(bucket, key, size, "stored object");
        Ok(())
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify("delete_object", bucket, key, err))?;
        debug!(bucket, key, "removed object");
        Ok(())
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        mode: ListMode,
    ) -> BoxStream<'a, StoreResult<ObjectInfo>> {
        // State: `None` once the last page was read, `Some(token)` otherwise.
        let pages = stream::try_unfold(Some(None::<String>), move |state| async move {
            let Some(token) = state else {
                return Ok(None);
            };

            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(token);
            if mode == ListMode::TopLevel {
                request = request.delimiter(PATH_DELIMITER);
            }
            let page = request
                .send()
                .await
                .map_err(|err| classify("list_objects_v2", bucket, "", err))?;

            let objects = page
                .contents()
                .iter()
                .filter_map(|object| {
                    object.key().map(|key| ObjectInfo {
                        key: key.to_string(),
                        size: content_length(object.size()),
                        content_type: None,
                    })
                })
                .collect::<Vec<_>>();
            debug!(bucket, count = objects.len(), "listed page");

            let next = page
                .next_continuation_token()
                .filter(|_| page.is_truncated() == Some(true))
                .map(|token| Some(token.to_string()));
            Ok(Some((objects, next)))
        });

        pages
            .map_ok(|objects| stream::iter(objects.into_iter().map(Ok::<_, StoreError>)))
            .try_flatten()
            .boxed()
    }

    async fn get_object_tags(&self, bucket: &str, key: &str) -> StoreResult<Tags> {
        let output = self
            .client
            .get_object_tagging()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify("get_object_tagging", bucket, key, err))?;

        Ok(output
            .tag_set()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }

    async fn set_object_tags(&self, bucket: &str, key: &str, tags: &Tags) -> StoreResult<()> {
        let tag_set = tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| StoreError::backend("put_object_tagging", err.to_string()))?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|err| StoreError::backend("put_object_tagging", err.to_string()))?;

        self.client
            .put_object_tagging()
            .bucket(bucket)
            .key(key)
            .tagging(tagging)
            .send()
            .await
            .map_err(|err| classify("put_object_tagging", bucket, key, err))?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.client
            .list_buckets()
            .send()
            .await
            .map_err(|err| {
                StoreError::backend("list_buckets", DisplayErrorContext(&err).to_string())
            })?;
        Ok(())
    }
}

/// Map an SDK failure onto [`StoreError`].
///
/// HEAD requests carry no error body, so a bare 404 counts as a missing key
/// unless the service explicitly reported a missing bucket.
fn classify<E>(
    operation: &'static str,
    bucket: &str,
    key: &str,
    err: SdkError<E, HttpResponse>,
) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err.code();
    let missing_key = matches!(code, Some("NoSuchKey" | "NotFound"))
        || (code != Some("NoSuchBucket")
            && err
                .raw_response()
                .is_some_and(|response| response.status().as_u16() == 404));

    if missing_key {
        StoreError::not_found(bucket, key)
    } else {
        StoreError::backend(operation, DisplayErrorContext(&err).to_string())
    }
}

/// Encode tags for the `x-amz-tagging` header.
///
/// The header is URL-query encoded; only unreserved characters are accepted
/// so that no escaping is needed.
fn tagging_header(tags: &Tags) -> StoreResult<String> {
    let unreserved = |s: &str| {
        !s.is_empty()
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'))
    };

    let mut pairs = Vec::with_capacity(tags.len());
    for (key, value) in tags {
        if !unreserved(key) || !unreserved(value) {
            return Err(StoreError::backend(
                "put_object",
                format!("tag `{key}={value}` cannot be sent as an upload header"),
            ));
        }
        pairs.push(format!("{key}={value}"));
    }
    Ok(pairs.join("&"))
}

fn content_length(value: Option<i64>) -> u64 {
    value.unwrap_or(0).max(0) as u64
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}
