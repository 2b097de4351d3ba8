//! S3-compatible bucket backend built on `aws-sdk-s3`.

use crate::{
    config::BucketCredentials,
    errors::{RemoteError, RemoteResult},
    models::asset::RemoteKey,
    services::object_store::{ObjectMeta, ObjectStore, PutRequest, SHA256_METADATA_KEY},
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    config::{Credentials, StalledStreamProtectionConfig},
    error::ProvideErrorMetadata,
    operation::head_object::HeadObjectError,
    primitives::ByteStream,
};
use tracing::debug;

pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// Build a client from the mounted credential file, or from the default
    /// AWS provider chain when no file is present.
    pub async fn connect(credentials: Option<BucketCredentials>) -> Self {
        let client = match credentials {
            Some(creds) => {
                let provider = Credentials::new(
                    &creds.access_key_id,
                    &creds.secret_access_key,
                    creds.session_token.clone(),
                    None,
                    "bucket-credentials-file",
                );
                let region = creds.region.clone().unwrap_or_else(|| "auto".to_string());

                let mut builder = aws_sdk_s3::Config::builder()
                    .region(Region::new(region))
                    .credentials_provider(provider)
                    .stalled_stream_protection(StalledStreamProtectionConfig::disabled());
                if let Some(endpoint) = &creds.endpoint_url {
                    builder = builder.endpoint_url(endpoint).force_path_style(true);
                }
                aws_sdk_s3::Client::from_conf(builder.build())
            }
            None => {
                let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
                aws_sdk_s3::Client::new(&sdk_config)
            }
        };

        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head(&self, key: &RemoteKey) -> RemoteResult<Option<ObjectMeta>> {
        let result = self
            .client
            .head_object()
            .bucket(&key.bucket)
            .key(&key.key)
            .send()
            .await;

        match result {
            Ok(output) => {
                // S3 content-length is non-negative
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                let sha256 = output
                    .metadata()
                    .and_then(|meta| meta.get(SHA256_METADATA_KEY))
                    .cloned();
                Ok(Some(ObjectMeta {
                    size,
                    etag: output.e_tag().map(str::to_string),
                    // SSE-KMS, SSE-C and multipart ETags are not body digests
                    etag_is_md5: false,
                    sha256,
                }))
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(HeadObjectError::is_not_found)
                {
                    debug!(%key, "object not found");
                    return Ok(None);
                }
                Err(RemoteError::unavailable(&key.bucket, &key.key, err))
            }
        }
    }

    async fn put(&self, key: &RemoteKey, request: PutRequest) -> RemoteResult<()> {
        let length = request.body.len() as i64;

        self.client
            .put_object()
            .bucket(&key.bucket)
            .key(&key.key)
            .body(ByteStream::from(request.body))
            .content_length(length)
            .content_type(request.content_type)
            .cache_control(request.cache_control)
            .content_md5(request.content_md5)
            .metadata(SHA256_METADATA_KEY, request.sha256)
            .send()
            .await
            .map_err(|err| {
                if err.code() == Some("BadDigest") {
                    RemoteError::DigestMismatch {
                        bucket: key.bucket.clone(),
                        key: key.key.clone(),
                    }
                } else {
                    RemoteError::unavailable(&key.bucket, &key.key, err)
                }
            })?;

        Ok(())
    }
}
