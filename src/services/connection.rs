//! Lifecycle of the shared object store client.
//!
//! The client is built at most once per [`Connection`], health-checked as
//! part of construction, and handed out as a shared read-only `Arc`.

use crate::{
    config::StorageConfig,
    store::{ObjectStore, StoreError, s3::S3Store},
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::OnceCell, time::timeout};
use tracing::info;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("unable to ping object storage at {endpoint}: {source}")]
    HealthCheck {
        endpoint: String,
        #[source]
        source: StoreError,
    },
    #[error("object storage at {endpoint} did not answer within {after:?}")]
    HealthCheckTimeout { endpoint: String, after: Duration },
}

pub struct Connection {
    config: StorageConfig,
    store: OnceCell<Arc<dyn ObjectStore>>,
}

impl Connection {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            store: OnceCell::new(),
        }
    }

    /// Shared S3 client, created and health-checked on first use.
    pub async fn store(&self) -> Result<Arc<dyn ObjectStore>, ConnectError> {
        self.store_with(|config| Arc::new(S3Store::new(config)) as Arc<dyn ObjectStore>)
            .await
    }

    /// Like [`Connection::store`], building the client with `connect`.
    ///
    /// Concurrent first callers wait on a single construction. A failed
    /// health check leaves the cell empty.
    pub async fn store_with<F>(&self, connect: F) -> Result<Arc<dyn ObjectStore>, ConnectError>
    where
        F: FnOnce(&StorageConfig) -> Arc<dyn ObjectStore>,
    {
        let store = self
            .store
            .get_or_try_init(|| async move {
                let endpoint = self.config.endpoint_url();
                let store = connect(&self.config);
                match timeout(HEALTH_CHECK_TIMEOUT, store.health_check()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(source)) => return Err(ConnectError::HealthCheck { endpoint, source }),
                    Err(_) => {
                        return Err(ConnectError::HealthCheckTimeout {
                            endpoint,
                            after: HEALTH_CHECK_TIMEOUT,
                        });
                    }
                }
                info!(%endpoint, "object storage initialized");
                Ok(store)
            })
            .await?;
        Ok(store.clone())
    }
}
