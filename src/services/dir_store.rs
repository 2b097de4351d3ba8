//! src/services/dir_store.rs
//!
//! DirStore: a bucket backed by a local directory tree. Object payloads are
//! sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}` and each payload
//! has a small JSON sidecar holding its etag, SHA-256 and headers.
//!
//! Payloads are written to a temp file, fsynced and renamed into place, so a
//! half-written body is never visible to `head`.

use crate::{
    errors::{RemoteError, RemoteResult},
    models::asset::RemoteKey,
    services::object_store::{ObjectMeta, ObjectStore, PutRequest},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Sidecar metadata persisted next to each payload.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct StoredMeta {
    etag: String,
    sha256: String,
    content_type: String,
    cache_control: String,
    last_modified: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct DirStore {
    /// Base directory on disk where buckets live.
    base_path: PathBuf,
}

impl DirStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Rejects keys that begin with `/`, contain `..` or control characters.
    fn ensure_key_safe(key: &RemoteKey) -> RemoteResult<()> {
        let k = key.key.as_str();
        let invalid = k.is_empty()
            || k.len() > MAX_OBJECT_KEY_LEN
            || k.starts_with('/')
            || k.ends_with('/')
            || k.contains("..")
            || k.bytes().any(|b| b.is_ascii_control() || b == b'\\');
        let bad_bucket = key.bucket.is_empty()
            || key.bucket.contains('/')
            || key.bucket.contains("..");

        if invalid || bad_bucket {
            return Err(RemoteError::InvalidKey {
                bucket: key.bucket.clone(),
                key: key.key.clone(),
            });
        }
        Ok(())
    }

    /// Two-level shard identifiers: the first two bytes of MD5(bucket/key) as hex.
    fn object_shards(key: &RemoteKey) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", key.bucket, key.key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/bucket/{shard}/{shard}/{key}`. Parents may not exist yet.
    fn object_path(&self, key: &RemoteKey) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(&key.bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(&key.key);
        path
    }

    fn sidecar_path(object_path: &Path) -> PathBuf {
        let mut name = object_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".meta.json");
        object_path.with_file_name(name)
    }

    fn io_error(key: &RemoteKey, err: io::Error) -> RemoteError {
        RemoteError::unavailable(&key.bucket, &key.key, err)
    }

    /// Write `bytes` to a fresh temp file in `dir` and fsync it.
    async fn write_temp(dir: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        match result {
            Ok(()) => Ok(tmp_path),
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ObjectStore for DirStore {
    async fn head(&self, key: &RemoteKey) -> RemoteResult<Option<ObjectMeta>> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);

        let size = match fs::metadata(&file_path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Self::io_error(key, err)),
        };

        let stored = match fs::read(Self::sidecar_path(&file_path)).await {
            Ok(raw) => serde_json::from_slice::<StoredMeta>(&raw).ok(),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(Self::io_error(key, err)),
        };
        if stored.is_none() {
            debug!("no sidecar metadata for {}", file_path.display());
        }

        Ok(Some(ObjectMeta {
            size,
            etag: stored.as_ref().map(|m| format!("\"{}\"", m.etag)),
            etag_is_md5: stored.is_some(),
            sha256: stored.map(|m| m.sha256),
        }))
    }

    async fn put(&self, key: &RemoteKey, request: PutRequest) -> RemoteResult<()> {
        Self::ensure_key_safe(key)?;

        let digest = md5::compute(&request.body);
        if general_purpose::STANDARD.encode(digest.0) != request.content_md5 {
            return Err(RemoteError::DigestMismatch {
                bucket: key.bucket.clone(),
                key: key.key.clone(),
            });
        }

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            Self::io_error(
                key,
                io::Error::new(ErrorKind::Other, "object path missing parent directory"),
            )
        })?;
        fs::create_dir_all(&parent)
            .await
            .map_err(|err| Self::io_error(key, err))?;

        let stored = StoredMeta {
            etag: format!("{digest:x}"),
            sha256: request.sha256,
            content_type: request.content_type.to_string(),
            cache_control: request.cache_control.to_string(),
            last_modified: Utc::now(),
        };
        let sidecar = serde_json::to_vec(&stored).map_err(|err| Self::io_error(key, err.into()))?;

        let body_tmp = Self::write_temp(&parent, &request.body)
            .await
            .map_err(|err| Self::io_error(key, err))?;
        let meta_tmp = match Self::write_temp(&parent, &sidecar).await {
            Ok(path) => path,
            Err(err) => {
                let _ = fs::remove_file(&body_tmp).await;
                return Err(Self::io_error(key, err));
            }
        };

        // Sidecar first, payload last: the payload's rename is what makes the
        // object visible.
        let renamed = async {
            fs::rename(&meta_tmp, Self::sidecar_path(&file_path)).await?;
            fs::rename(&body_tmp, &file_path).await
        }
        .await;

        if let Err(err) = renamed {
            let _ = fs::remove_file(&meta_tmp).await;
            let _ = fs::remove_file(&body_tmp).await;
            return Err(Self::io_error(key, err));
        }

        debug!("stored {} at {}", key, file_path.display());
        Ok(())
    }
}
