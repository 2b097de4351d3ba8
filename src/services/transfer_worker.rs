//! Uploads one asset: read, checksum, put, verify.

use crate::{
    errors::RemoteError,
    models::{
        asset::{AssetRecord, RemoteKey},
        outcome::{FailureReason, TransferOutcome},
    },
    services::{
        checksum::{ContentDigests, ExpectedChecksum},
        local_resolver::LocalAsset,
        object_store::{CACHE_CONTROL, ObjectMeta, ObjectStore, PutRequest},
    },
};
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct TransferWorker {
    store: Arc<dyn ObjectStore>,
    cancel: CancellationToken,
}

impl TransferWorker {
    pub fn new(store: Arc<dyn ObjectStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// One attempt. Never retries; the driver owns retry policy.
    pub async fn transfer(
        &self,
        record: &AssetRecord,
        local: &LocalAsset,
        key: &RemoteKey,
    ) -> TransferOutcome {
        // 1. read + checksum
        let body = match tokio::fs::read(&local.path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                return TransferOutcome::Failed(FailureReason::MissingSource(format!(
                    "`{}` could not be read: {err}",
                    local.path.display()
                )));
            }
        };
        let digests = match ContentDigests::compute_blocking(body.clone()).await {
            Ok(digests) => digests,
            Err(err) => return TransferOutcome::Failed(FailureReason::Transient(err.to_string())),
        };

        // 2. catalog checksum
        if let Some(raw) = &record.checksum {
            let expected = ExpectedChecksum::parse(raw);
            if let Err(actual) = digests.verify(&expected) {
                return TransferOutcome::Failed(FailureReason::ChecksumMismatch {
                    expected: expected.as_str().to_string(),
                    actual,
                });
            }
        }

        if self.cancel.is_cancelled() {
            return TransferOutcome::Failed(FailureReason::Cancelled);
        }

        // 3. put
        let request = PutRequest {
            body,
            content_type: record.content_type(),
            cache_control: CACHE_CONTROL,
            content_md5: digests.content_md5(),
            sha256: digests.sha256_hex(),
        };
        debug!(asset_id = record.id, %key, size = digests.size, "putting object");
        if let Err(err) = self.store.put(key, request).await {
            return TransferOutcome::Failed(classify(err));
        }

        // 4. independent verification
        match self.store.head(key).await {
            Ok(Some(meta)) => match verify_remote(&meta, &digests) {
                Ok(()) => {
                    info!(asset_id = record.id, %key, size = digests.size, "uploaded");
                    TransferOutcome::Uploaded
                }
                Err(why) => TransferOutcome::Failed(FailureReason::UploadUnverified(why)),
            },
            Ok(None) => TransferOutcome::Failed(FailureReason::UploadUnverified(
                "object not visible after put".to_string(),
            )),
            Err(err) => TransferOutcome::Failed(classify(err)),
        }
    }
}

/// Map a bucket error onto the failure taxonomy used for retries.
pub(crate) fn classify(err: RemoteError) -> FailureReason {
    match err {
        RemoteError::Unavailable { .. } => FailureReason::Transient(err.to_string()),
        RemoteError::DigestMismatch { .. } => FailureReason::UploadUnverified(err.to_string()),
        RemoteError::InvalidKey { .. } => FailureReason::Rejected(err.to_string()),
    }
}

/// Size always; MD5 and SHA-256 whenever the backend reports them.
fn verify_remote(meta: &ObjectMeta, local: &ContentDigests) -> Result<(), String> {
    if meta.size != local.size {
        return Err(format!("remote size {} != local size {}", meta.size, local.size));
    }
    if let Some(md5) = meta.etag_md5() {
        let want = local.md5_hex();
        if md5 != want {
            return Err(format!("remote md5 {md5} != local md5 {want}"));
        }
    }
    if let Some(sha256) = &meta.sha256 {
        let want = local.sha256_hex();
        if !sha256.eq_ignore_ascii_case(&want) {
            return Err(format!("remote sha256 {sha256} != local sha256 {want}"));
        }
    }
    Ok(())
}
