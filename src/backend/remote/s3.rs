//! S3 object store
//!
//! Credentials come from the standard AWS chain (env vars, ~/.aws, SSO,
//! instance roles). Every operation is bounded by the configured timeout so
//! a dead network fails the request instead of hanging the session.

use super::{RemoteObject, RemoteStore};
use crate::config::schema::S3Config;
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Deletes in flight at once while clearing a prefix
const DELETE_CONCURRENCY: usize = 16;

/// Error codes meaning the bucket can't be used at all
const SYSTEMIC_ERROR_CODES: &[&str] = &[
    "NoSuchBucket",
    "AccessDenied",
    "AllAccessDisabled",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "InvalidToken",
];

/// Bucket (and optional endpoint) holding cache objects
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from configuration
    pub async fn connect(config: &S3Config) -> CacheResult<Self> {
        let bucket = config
            .bucket
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                CacheError::Config("the s3 backend requires a bucket (--s3-bucket)".to_string())
            })?;

        let timeouts = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let mut aws_config_loader =
            aws_config::defaults(BehaviorVersion::latest()).timeout_config(timeouts);

        if let Some(ref region) = config.region {
            aws_config_loader =
                aws_config_loader.region(aws_sdk_s3::config::Region::new(region.clone()));
        }

        let aws_config = aws_config_loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        // MinIO and LocalStack only speak path-style addressing.
        if let Some(ref endpoint) = config.endpoint_url {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        info!(bucket = %bucket, endpoint = ?config.endpoint_url, "Connected S3 store");
        Ok(Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket,
        })
    }

    async fn list_keys(&self, prefix: &str) -> CacheResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| classify("list_objects_v2", e))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(keys)
    }

    async fn delete_key(&self, key: String) -> CacheResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| classify("delete_object", e))?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn get_object(&self, key: &str) -> CacheResult<Option<RemoteObject>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) if is_missing_object(&err) => return Ok(None),
            Err(err) => return Err(classify("get_object", err)),
        };

        let attributes = output.metadata().cloned().unwrap_or_default();
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| CacheError::Remote(format!("reading body of {}: {}", key, e)))?
            .into_bytes()
            .to_vec();

        Ok(Some(RemoteObject { body, attributes }))
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> CacheResult<()> {
        let size = body.len();
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(i64::try_from(size).unwrap_or(i64::MAX))
            .body(ByteStream::from(body));
        for (name, value) in attributes {
            request = request.metadata(name, value);
        }

        request
            .send()
            .await
            .map_err(|e| classify("put_object", e))?;
        debug!(key = %key, size, "Uploaded object");
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let keys = self.list_keys(prefix).await?;
        let total = keys.len();

        let results: Vec<CacheResult<()>> = stream::iter(keys)
            .map(|key| self.delete_key(key))
            .buffer_unordered(DELETE_CONCURRENCY)
            .collect()
            .await;

        let mut deleted = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(()) => deleted += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        debug!(prefix = %prefix, deleted, total, "Deleted objects");
        Ok(deleted)
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

/// A plain 404 for the object; a missing bucket is reported separately
fn is_missing_object<E: ProvideErrorMetadata>(err: &SdkError<E>) -> bool {
    matches!(err, SdkError::ServiceError(e)
        if e.raw().status().as_u16() == 404 && e.err().code() != Some("NoSuchBucket"))
}

/// Sort an SDK failure into "bucket unusable" or "this request failed"
fn classify<E>(operation: &str, err: SdkError<E>) -> CacheError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match &err {
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            let code = service.err().code().unwrap_or("Unknown");
            let message = format!("{} failed: {} (HTTP {})", operation, code, status);
            if matches!(status, 401 | 403) || SYSTEMIC_ERROR_CODES.contains(&code) {
                CacheError::RemoteUnavailable(message)
            } else {
                CacheError::Remote(message)
            }
        }
        SdkError::ConstructionFailure(_) => CacheError::RemoteUnavailable(format!(
            "{} failed: {}",
            operation,
            DisplayErrorContext(&err)
        )),
        _ => CacheError::Remote(format!(
            "{} failed: {}",
            operation,
            DisplayErrorContext(&err)
        )),
    }
}
