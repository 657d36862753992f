//! Object storage gateway for image attachments.
//!
//! Talks to an S3-compatible store (MinIO in the default deployment) through
//! the AWS SDK with an endpoint override and path-style addressing. Object
//! keys are always derived from the ownership chain
//! (`{user_id}/{session_id}/{lap_id}_{image_id}.{format}`), never accepted
//! from clients, so one tenant's key space cannot reach another's.

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::StorageConfig;

/// Initial backoff between retry attempts; doubles per attempt
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// S3 and MinIO cap a single DeleteObjects request at 1000 keys
const MAX_DELETE_BATCH: usize = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Object storage unavailable: {0}")]
    Unavailable(String),
}

/// Build the storage key for an image from its ownership chain.
///
/// The format is fixed: `{user_id}/{session_id}/{lap_id}_{image_id}.{format}`.
pub fn object_key(
    user_id: &str,
    session_id: &str,
    lap_id: &str,
    image_id: &str,
    format: &str,
) -> String {
    format!("{}/{}/{}_{}.{}", user_id, session_id, lap_id, image_id, format)
}

/// Key prefix covering every image of a lap
pub fn lap_prefix(user_id: &str, session_id: &str, lap_id: &str) -> String {
    format!("{}/{}/{}_", user_id, session_id, lap_id)
}

/// Key prefix covering every image of a session
pub fn session_prefix(user_id: &str, session_id: &str) -> String {
    format!("{}/{}/", user_id, session_id)
}

fn is_transient<E>(err: &SdkError<E>) -> bool {
    matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    )
}

#[derive(Clone)]
pub struct ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    max_attempts: u32,
    presign_ttl: Duration,
}

impl ObjectStorage {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "clockwork-config",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            // MinIO serves buckets under the path, not a subdomain
            .force_path_style(true)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(Duration::from_secs(config.request_timeout_secs))
                    .build(),
            )
            // Retries are handled here with our own bound, not by the SDK
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            max_attempts: config.max_attempts.max(1),
            presign_ttl: Duration::from_secs(config.presign_ttl_secs),
        }
    }

    pub fn presign_ttl(&self) -> Duration {
        self.presign_ttl
    }

    /// Create the bucket if it doesn't exist. Non-fatal if the store is
    /// unreachable at startup; uploads will surface the failure instead.
    pub async fn ensure_bucket(&self) {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {}
            Err(e) => {
                let missing = matches!(&e, SdkError::ServiceError(svc) if svc.err().is_not_found());
                if missing {
                    match self.client.create_bucket().bucket(&self.bucket).send().await {
                        Ok(_) => info!(bucket = %self.bucket, "Created storage bucket"),
                        Err(e) => error!("Failed to create storage bucket: {}", e),
                    }
                } else {
                    warn!("Object storage not reachable during bucket check: {}", e);
                }
            }
        }
    }

    /// Upload an object. Transient transport errors are retried with
    /// exponential backoff up to the configured attempt bound.
    pub async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let mut attempt = 0;
        let mut backoff = RETRY_BACKOFF;
        loop {
            attempt += 1;
            let result = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(bytes.clone()))
                .content_type(content_type)
                .send()
                .await;

            match result {
                Ok(_) => return Ok(()),
                Err(e) if is_transient(&e) && attempt < self.max_attempts => {
                    warn!(key, attempt, "Transient storage error, retrying: {}", e);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    error!(key, "Failed to upload object: {}", e);
                    return Err(StorageError::Unavailable(e.to_string()));
                }
            }
        }
    }

    /// Generate a time-limited presigned download URL for an existing object.
    ///
    /// Fails with [`StorageError::NotFound`] if the key does not exist.
    pub async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        if let Err(e) = self.client.head_object().bucket(&self.bucket).key(key).send().await {
            if let SdkError::ServiceError(svc) = &e {
                if svc.err().is_not_found() {
                    return Err(StorageError::NotFound(key.to_string()));
                }
            }
            return Err(StorageError::Unavailable(e.to_string()));
        }

        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    /// Delete an object. Idempotent: deleting a missing key succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| {
                error!(key, "Failed to delete object: {}", e);
                StorageError::Unavailable(e.to_string())
            })
    }

    /// List all keys under a prefix, following pagination.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            if response.is_truncated() == Some(true) {
                continuation = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(keys)
    }

    /// Delete every object under a prefix (lap or session cascade).
    ///
    /// Keys are deleted in batches of [`MAX_DELETE_BATCH`], matching the
    /// DeleteObjects request cap.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        let keys = self.list_keys(prefix).await?;

        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            let objects: Vec<ObjectIdentifier> = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<_, _>>()
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .build()
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| {
                    error!(prefix, "Failed to batch-delete objects: {}", e);
                    StorageError::Unavailable(e.to_string())
                })?;
        }

        Ok(())
    }
}
