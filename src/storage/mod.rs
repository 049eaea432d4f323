//! Object storage gateway
//!
//! [`StorageGateway`] owns the remote copy of the dataset. It builds clients
//! through an [`ObjectStoreConnector`], classifies every [`StoreError`] with
//! [`classify_storage_error`] and retries what the taxonomy allows.
//!
//! - Client construction: 3 retries on network and service errors, no retry
//!   when configuration is missing
//! - Upload: 3 retries on network, service and throttling errors, delay
//!   capped at 30 s
//! - Download: single attempt; any failure means "absent"
//! - Publish: every object is attempted independently, see [`PublishReport`]

use crate::classify::{classify_storage_error, ClassifiedError, ErrorKind, Subsystem};
use crate::dataset::ExistingDataset;
use crate::retry::config::{DEFAULT_BASE_DELAY, STORAGE_MAX_RETRIES, UPLOAD_MAX_DELAY};
use crate::retry::{retry_with_backoff, RetryObserver, RetryPolicy};
use crate::{Dataset, CONFIG_OBJECT_KEY, DATA_OBJECT_KEY};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod config_js;
pub mod local;
pub mod r2;

pub use local::LocalMirror;

/// Content type of the dataset object
pub const DATA_CONTENT_TYPE: &str = "application/json";

/// Cache policy of the dataset object
pub const DATA_CACHE_CONTROL: &str = "max-age=300";

/// Content type of the configuration script
pub const CONFIG_CONTENT_TYPE: &str = "application/javascript";

/// Cache policy of the configuration script
pub const CONFIG_CACHE_CONTROL: &str = "max-age=3600";

/// Default connect/read timeout of the storage client
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(30);

const CLIENT_RETRYABLE: &[ErrorKind] =
    &[ErrorKind::NetworkTransport, ErrorKind::ServiceUnavailable];

const UPLOAD_RETRYABLE: &[ErrorKind] = &[
    ErrorKind::NetworkTransport,
    ErrorKind::ServiceUnavailable,
    ErrorKind::Throttled,
];

const INCOMPLETE_CONFIG: &str = "storage configuration incomplete";

/// Raw object store failure, before classification
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    /// Service error code (`NoSuchKey`, `SlowDown`, ...)
    pub code: Option<String>,
    /// Error message
    pub message: String,
    /// The object does not exist
    pub not_found: bool,
}

impl StoreError {
    /// Failure without a service code
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            not_found: false,
        }
    }

    /// Failure with a service code
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            not_found: code == "NoSuchKey",
            code: Some(code),
            message: message.into(),
        }
    }

    /// Missing-key response
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_code("NoSuchKey", message)
    }

    fn classify(&self) -> ClassifiedError {
        classify_storage_error(self.code.as_deref(), &self.message)
    }
}

/// Raw object store client
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), StoreError>;

    /// Read the object under `key`
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// Builds [`ObjectStore`] clients
#[async_trait]
pub trait ObjectStoreConnector: Send + Sync {
    /// Create a client for the given settings
    async fn connect(&self, settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, StoreError>;
}

/// Object storage settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// S3-compatible endpoint
    pub endpoint_url: Option<String>,
    /// Access key id
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// Bucket holding the published objects
    pub bucket: Option<String>,
    /// Public base URL of the bucket
    pub public_url: Option<String>,
    /// Connect and read timeout
    pub timeout: Duration,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            bucket: None,
            public_url: None,
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }
}

impl StorageSettings {
    /// Names of required settings that are missing or blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("endpoint", &self.endpoint_url),
            ("access key id", &self.access_key_id),
            ("secret access key", &self.secret_access_key),
            ("bucket", &self.bucket),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }

    /// Whether every required setting is present
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// One object to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishObject {
    /// Object key
    pub key: String,
    /// Object body
    pub body: Vec<u8>,
    /// Content-Type header
    pub content_type: &'static str,
    /// Cache-Control header
    pub cache_control: &'static str,
}

impl PublishObject {
    /// The dataset document, pretty-printed
    pub fn dataset(dataset: &Dataset) -> Result<Self, serde_json::Error> {
        Ok(Self {
            key: DATA_OBJECT_KEY.to_string(),
            body: dataset.to_json_pretty()?.into_bytes(),
            content_type: DATA_CONTENT_TYPE,
            cache_control: DATA_CACHE_CONTROL,
        })
    }

    /// The browser configuration script
    pub fn config_js(timezone: &str, public_url: Option<&str>) -> Self {
        Self {
            key: CONFIG_OBJECT_KEY.to_string(),
            body: config_js::render_config_js(timezone, public_url).into_bytes(),
            content_type: CONFIG_CONTENT_TYPE,
            cache_control: CONFIG_CACHE_CONTROL,
        }
    }
}

/// Overall result of a multi-object publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Every object uploaded
    AllSucceeded,
    /// Some objects uploaded, some failed
    Partial,
    /// No object uploaded
    AllFailed,
}

/// Per-object results of a publish
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    /// Keys uploaded successfully
    pub succeeded: Vec<String>,
    /// Keys that failed, with the final classified error
    pub failed: Vec<(String, ClassifiedError)>,
}

impl PublishReport {
    /// Report where every object failed for the same reason
    fn all_failed(objects: &[PublishObject], error: &ClassifiedError) -> Self {
        Self {
            succeeded: Vec::new(),
            failed: objects
                .iter()
                .map(|o| (o.key.clone(), error.clone()))
                .collect(),
        }
    }

    /// Summarize as one of three outcomes
    pub fn outcome(&self) -> PublishOutcome {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (_, true) => PublishOutcome::AllSucceeded,
            (false, false) => PublishOutcome::Partial,
            (true, false) => PublishOutcome::AllFailed,
        }
    }

    /// First failure that needs a human (authentication or capacity)
    pub fn escalating_failure(&self) -> Option<&ClassifiedError> {
        self.failed
            .iter()
            .map(|(_, err)| err)
            .find(|err| matches!(err.kind, ErrorKind::Authentication | ErrorKind::StorageCapacity))
    }

    /// First failure, if any
    pub fn first_failure(&self) -> Option<&ClassifiedError> {
        self.failed.first().map(|(_, err)| err)
    }

    /// `"config.js: R2 service error: ..."` joined with `"; "`
    pub fn failure_summary(&self) -> String {
        self.failed
            .iter()
            .map(|(key, err)| format!("{}: {}", key, err))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Retrying, classifying object storage gateway
pub struct StorageGateway {
    connector: Arc<dyn ObjectStoreConnector>,
    settings: StorageSettings,
    client_policy: RetryPolicy,
    upload_policy: RetryPolicy,
    observer: Option<Arc<dyn RetryObserver>>,
    mirror: Option<LocalMirror>,
}

impl StorageGateway {
    /// Create a gateway with default retry policies
    pub fn new(connector: Arc<dyn ObjectStoreConnector>, settings: StorageSettings) -> Self {
        Self {
            connector,
            settings,
            client_policy: RetryPolicy::new(STORAGE_MAX_RETRIES, DEFAULT_BASE_DELAY)
                .with_retryable(CLIENT_RETRYABLE),
            upload_policy: RetryPolicy::new(STORAGE_MAX_RETRIES, DEFAULT_BASE_DELAY)
                .with_max_delay(UPLOAD_MAX_DELAY)
                .with_retryable(UPLOAD_RETRYABLE),
            observer: None,
            mirror: None,
        }
    }

    /// Override the upload retry count
    pub fn with_upload_retries(mut self, max_retries: u32) -> Self {
        self.upload_policy.max_retries = max_retries;
        self
    }

    /// Receive a signal before every retry
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Also write published objects to a local directory
    pub fn with_mirror(mut self, mirror: LocalMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Storage settings in use
    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    fn bucket(&self) -> &str {
        self.settings.bucket.as_deref().unwrap_or_default()
    }

    /// Build a client, retrying network and service failures.
    ///
    /// Missing configuration is an immediate
    /// [`ErrorKind::Authentication`] failure.
    pub async fn create_client(&self) -> Result<Arc<dyn ObjectStore>, ClassifiedError> {
        let missing = self.settings.missing_fields();
        if !missing.is_empty() {
            return Err(ClassifiedError::new(
                Subsystem::Storage,
                ErrorKind::Authentication,
                format!("{} (missing {})", INCOMPLETE_CONFIG, missing.join(", ")),
            ));
        }

        retry_with_backoff(
            &self.client_policy,
            "create storage client",
            self.observer.as_deref(),
            || async move {
                self.connector
                    .connect(&self.settings)
                    .await
                    .map_err(|e| e.classify())
            },
        )
        .await
    }

    /// Upload one object, retrying transient failures
    pub async fn upload_object(
        &self,
        client: &dyn ObjectStore,
        object: &PublishObject,
    ) -> Result<(), ClassifiedError> {
        let label = format!("upload {}", object.key);
        retry_with_backoff(
            &self.upload_policy,
            &label,
            self.observer.as_deref(),
            || async move {
                client
                    .put_object(
                        self.bucket(),
                        &object.key,
                        object.body.clone(),
                        object.content_type,
                        object.cache_control,
                    )
                    .await
                    .map_err(|e| e.classify())
            },
        )
        .await?;

        info!(key = %object.key, bytes = object.body.len(), "Uploaded object");
        Ok(())
    }

    /// Read one object; `None` when it is missing or the read failed
    pub async fn download_object(&self, client: &dyn ObjectStore, key: &str) -> Option<Vec<u8>> {
        match client.get_object(self.bucket(), key).await {
            Ok(body) => {
                debug!(key, bytes = body.len(), "Downloaded object");
                Some(body)
            }
            Err(e) if e.not_found => {
                info!(key, "Object not found in storage, starting fresh");
                None
            }
            Err(e) => {
                warn!(key, error = %e.classify(), "Failed to download object, starting fresh");
                None
            }
        }
    }

    /// Read and parse the stored dataset; `None` on any failure
    pub async fn download_dataset(&self) -> Option<ExistingDataset> {
        if !self.settings.is_complete() {
            info!("Storage not configured, starting from an empty dataset");
            return None;
        }

        let client = match self.create_client().await {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Could not create storage client for download");
                return None;
            }
        };

        let body = self.download_object(client.as_ref(), DATA_OBJECT_KEY).await?;
        match ExistingDataset::from_slice(&body) {
            Ok(dataset) => {
                info!(days = dataset.data.len(), "Loaded existing dataset");
                Some(dataset)
            }
            Err(e) => {
                warn!(error = %e, "Stored dataset is unreadable, starting fresh");
                None
            }
        }
    }

    /// Upload every object independently and report per-object results
    pub async fn publish_dataset(&self, objects: &[PublishObject]) -> PublishReport {
        if objects.is_empty() {
            debug!("Nothing to publish");
            return PublishReport::default();
        }

        if let Some(mirror) = &self.mirror {
            for object in objects {
                if let Err(e) = mirror.write(&object.key, &object.body) {
                    warn!(key = %object.key, error = %e, "Failed to write local mirror");
                }
            }
        }

        let client = match self.create_client().await {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Could not create storage client for publish");
                return PublishReport::all_failed(objects, &e);
            }
        };

        let mut report = PublishReport::default();
        for object in objects {
            match self.upload_object(client.as_ref(), object).await {
                Ok(()) => report.succeeded.push(object.key.clone()),
                Err(e) => {
                    warn!(key = %object.key, error = %e, "Failed to upload object");
                    report.failed.push((object.key.clone(), e));
                }
            }
        }

        match report.outcome() {
            PublishOutcome::AllSucceeded => info!(objects = objects.len(), "Published all objects"),
            PublishOutcome::Partial => warn!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "Partial publish"
            ),
            PublishOutcome::AllFailed => warn!("Publish failed for every object"),
        }
        report
    }
}
