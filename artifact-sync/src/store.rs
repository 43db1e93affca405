//! S3 implementation of [`ObjectStore`], built on the AWS SDK.
//!
//! Credentials come from the default provider chain (environment, profile,
//! instance role). An endpoint override switches to path-style addressing so
//! MinIO and localstack work unchanged.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use artifact_sync_core::config::RemoteLocation;
use artifact_sync_core::contract::{ObjectInfo, ObjectMetadata, ObjectStore};
use artifact_sync_core::error::StoreError;

pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    pub async fn from_remote(remote: &RemoteLocation) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(remote.region.clone()))
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &remote.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        info!(
            region = %remote.region,
            endpoint_url = remote.endpoint_url.as_deref().unwrap_or("default"),
            "Initialised S3 client"
        );
        Self {
            client: S3Client::from_conf(builder.build()),
        }
    }

    pub fn from_client(client: S3Client) -> Self {
        Self { client }
    }
}

/// Map an SDK failure onto the store taxonomy the retry policy understands.
fn classify<E, R>(bucket: &str, key: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(_) => match err.code() {
            Some("AccessDenied" | "Forbidden" | "InvalidAccessKeyId" | "SignatureDoesNotMatch") => {
                StoreError::AccessDenied {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message,
                }
            }
            Some("NoSuchKey" | "NotFound") => StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            Some("SlowDown" | "InternalError" | "ServiceUnavailable" | "RequestTimeout") => {
                StoreError::Network {
                    message,
                    retryable: true,
                }
            }
            _ => StoreError::Network {
                message,
                retryable: false,
            },
        },
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StoreError::Network {
                message,
                retryable: true,
            }
        }
        _ => StoreError::Other { message },
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StoreError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(ObjectMetadata {
                size: output.content_length().map(|l| l as u64).unwrap_or(0),
                user_metadata: output.metadata().cloned().unwrap_or_default(),
            })),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(classify(bucket, key, err)),
        }
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let mut request = self.client.put_object().bucket(bucket).key(key).body(body);
        for (k, v) in metadata {
            request = request.metadata(k, v);
        }
        request
            .send()
            .await
            .map_err(|err| classify(bucket, key, err))?;
        debug!(bucket, key, "put_object_from_file complete");
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data.to_vec()));
        for (k, v) in metadata {
            request = request.metadata(k, v);
        }
        request
            .send()
            .await
            .map_err(|err| classify(bucket, key, err))?;
        debug!(bucket, key, bytes = data.len(), "put_object complete");
        Ok(())
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<(), StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(bucket, key, err))?;

        let io_err = |e: std::io::Error| StoreError::io(path.display().to_string(), &e);
        let mut file = File::create(path).await.map_err(io_err)?;
        let mut body = response.body;
        while let Some(chunk) = body.try_next().await.map_err(|e| StoreError::Network {
            message: e.to_string(),
            retryable: true,
        })? {
            file.write_all(&chunk).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StoreError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|err| classify(bucket, prefix, err))?;

            for obj in response.contents() {
                objects.push(ObjectInfo {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().map(|s| s as u64).unwrap_or(0),
                });
            }

            match (response.is_truncated(), response.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(bucket, prefix, objects = objects.len(), "list_objects complete");
        Ok(objects)
    }
}
