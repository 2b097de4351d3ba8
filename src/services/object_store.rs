//! The bucket operations the migration needs: a metadata probe and a put.
//!
//! Backends must make a completed put visible as a single consistent object;
//! a partially written body must never show up in `head`.

use crate::{errors::RemoteResult, models::asset::RemoteKey};
use async_trait::async_trait;
use bytes::Bytes;

/// One year, immutable: objects are content-addressed and never rewritten in place.
pub const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// User-metadata entry carrying the SHA-256 of the body.
pub const SHA256_METADATA_KEY: &str = "sha256";

/// Object metadata returned by a `HEAD`-style probe.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    /// Raw `ETag`, possibly quoted.
    pub etag: Option<String>,
    /// Whether the backend guarantees `etag` is the MD5 of the body. S3 does
    /// not for SSE-KMS, SSE-C or multipart objects, so it never sets this.
    pub etag_is_md5: bool,
    /// Value of the `sha256` user-metadata entry, if the object has one.
    pub sha256: Option<String>,
}

impl ObjectMeta {
    /// The `ETag` as an MD5 hex digest, when the backend vouches for it.
    pub fn etag_md5(&self) -> Option<String> {
        if !self.etag_is_md5 {
            return None;
        }
        let clean = self.etag.as_deref()?.trim_matches('"');
        (clean.len() == 32 && clean.bytes().all(|b| b.is_ascii_hexdigit()))
            .then(|| clean.to_ascii_lowercase())
    }
}

/// Body and headers for one put.
#[derive(Clone, Debug)]
pub struct PutRequest {
    pub body: Bytes,
    pub content_type: &'static str,
    pub cache_control: &'static str,
    /// Base64 MD5 of `body`; backends reject a body that does not match.
    pub content_md5: String,
    /// Hex SHA-256 of `body`, stored as user metadata.
    pub sha256: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata-only probe. `Ok(None)` means the object is absent; any error
    /// means the answer is unknown.
    async fn head(&self, key: &RemoteKey) -> RemoteResult<Option<ObjectMeta>>;

    /// Store `request.body` under `key`, replacing any existing object.
    async fn put(&self, key: &RemoteKey, request: PutRequest) -> RemoteResult<()>;
}
