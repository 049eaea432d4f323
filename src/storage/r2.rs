//! S3-compatible transport (Cloudflare R2)
//!
//! R2 speaks the S3 API with region `auto` and path-style addressing. Every
//! failure is turned into a [`StoreError`] carrying the service error code
//! when there is one; transport failures get a synthetic code
//! (`NetworkingError`, `RequestTimeout`) so they classify the same way.

use crate::storage::{ObjectStore, ObjectStoreConnector, StorageSettings, StoreError};
use async_trait::async_trait;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

const R2_REGION: &str = "auto";

/// [`ObjectStore`] backed by the AWS S3 SDK
pub struct R2Store {
    client: Client,
}

impl R2Store {
    /// Build a client from complete settings
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, StoreError> {
        let (Some(endpoint), Some(key_id), Some(secret)) = (
            settings.endpoint_url.as_deref(),
            settings.access_key_id.as_deref(),
            settings.secret_access_key.as_deref(),
        ) else {
            return Err(StoreError::with_code(
                "NoCredentialsError",
                "storage configuration incomplete",
            ));
        };

        let credentials = Credentials::new(key_id, secret, None, None, "step-tracker-sync");
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(settings.timeout)
            .read_timeout(settings.timeout)
            .build();

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(R2_REGION))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .timeout_config(timeouts)
            .build();

        debug!(endpoint, "Created object storage client");
        Ok(Self {
            client: Client::from_conf(config),
        })
    }
}

#[async_trait]
impl ObjectStore for R2Store {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .cache_control(cache_control)
            .send()
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(|service| service.is_no_such_key())
                    .unwrap_or(false);
                let mut err = store_error(e);
                err.not_found |= not_found;
                err
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::with_code("NetworkingError", e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }
}

/// Connector producing [`R2Store`] clients
#[derive(Debug, Default, Clone, Copy)]
pub struct R2Connector;

#[async_trait]
impl ObjectStoreConnector for R2Connector {
    async fn connect(
        &self,
        settings: &StorageSettings,
    ) -> Result<Arc<dyn ObjectStore>, StoreError> {
        Ok(Arc::new(R2Store::from_settings(settings)?))
    }
}

fn store_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    let code = match &err {
        SdkError::TimeoutError(_) => Some("RequestTimeout".to_string()),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            Some("RequestTimeout".to_string())
        }
        SdkError::DispatchFailure(_) => Some("NetworkingError".to_string()),
        _ => err.code().map(str::to_string),
    };

    StoreError {
        not_found: code.as_deref() == Some("NoSuchKey"),
        code,
        message,
    }
}
