//! Decides whether an asset is already in the bucket.
//!
//! This probe is what makes the job resumable without local state: a re-run
//! re-probes every key and only uploads what is still missing.

use crate::{
    errors::RemoteResult,
    models::asset::RemoteKey,
    services::{
        checksum::ExpectedChecksum,
        object_store::{ObjectMeta, ObjectStore},
    },
};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Presence {
    Present(ObjectMeta),
    Absent,
    /// An object exists but its size or recorded digest disagrees with the
    /// local file or the catalog. Left over from a failed or foreign write.
    Stale(ObjectMeta),
}

#[derive(Clone)]
pub struct ExistenceOracle {
    store: Arc<dyn ObjectStore>,
}

impl ExistenceOracle {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Metadata-only probe. A failed probe is an error, never "absent" and
    /// never "present".
    ///
    /// `local_size` is the size of the file the object should hold. The
    /// `sha256` metadata is written from the put request, not computed by
    /// the backend, so a short body can still carry a correct tag; size is
    /// the check that catches it.
    pub async fn probe(
        &self,
        key: &RemoteKey,
        expected: Option<&ExpectedChecksum>,
        local_size: u64,
    ) -> RemoteResult<Presence> {
        let Some(meta) = self.store.head(key).await? else {
            return Ok(Presence::Absent);
        };

        if meta.size != local_size {
            warn!(%key, remote = meta.size, local = local_size, "remote object has the wrong size");
            return Ok(Presence::Stale(meta));
        }

        let disagrees = match expected {
            None => false,
            Some(ExpectedChecksum::Sha256(want)) => {
                meta.sha256.as_deref().is_some_and(|have| !have.eq_ignore_ascii_case(want))
            }
            Some(ExpectedChecksum::Md5(want)) => meta.etag_md5().is_some_and(|have| have != *want),
            // Nothing can match it; never vouch for an object against it.
            Some(ExpectedChecksum::Unrecognized(_)) => true,
        };

        if disagrees {
            warn!(%key, "remote object does not match catalog checksum");
            return Ok(Presence::Stale(meta));
        }
        Ok(Presence::Present(meta))
    }

    #[cfg(test)]
    pub async fn exists(
        &self,
        key: &RemoteKey,
        expected: Option<&ExpectedChecksum>,
        local_size: u64,
    ) -> RemoteResult<bool> {
        Ok(matches!(
            self.probe(key, expected, local_size).await?,
            Presence::Present(_)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::RemoteError,
        services::{
            checksum::ContentDigests,
            object_store::{CACHE_CONTROL, PutRequest},
            test_support::MemoryStore,
        },
    };
    use bytes::Bytes;

    fn key() -> RemoteKey {
        RemoteKey {
            bucket: "media".into(),
            key: "a.png".into(),
        }
    }

    #[tokio::test]
    async fn absent_then_present() {
        let store = Arc::new(MemoryStore::default());
        let oracle = ExistenceOracle::new(store.clone());

        assert!(!oracle.exists(&key(), None, 5).await.unwrap());
        store.insert(&key(), b"hello");
        assert!(oracle.exists(&key(), None, 5).await.unwrap());
    }

    #[tokio::test]
    async fn probe_failure_is_an_error_not_absent() {
        let store = Arc::new(MemoryStore::default());
        store.fail_next_heads(1);
        let oracle = ExistenceOracle::new(store.clone());

        let err = oracle.exists(&key(), None, 5).await.unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable { .. }));
        assert!(!oracle.exists(&key(), None, 5).await.unwrap());
    }

    #[tokio::test]
    async fn mismatched_remote_digest_is_stale() {
        let store = Arc::new(MemoryStore::default());
        let oracle = ExistenceOracle::new(store.clone());

        let expected = ExpectedChecksum::parse(
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
        );
        // same size as "hello", different digest
        store.insert(&key(), b"hellp");
        let presence = oracle.probe(&key(), Some(&expected), 5).await.unwrap();
        assert!(matches!(presence, Presence::Stale(_)));
    }

    #[tokio::test]
    async fn matching_remote_digest_is_present() {
        let store = Arc::new(MemoryStore::default());
        store.insert(&key(), b"hello");
        let oracle = ExistenceOracle::new(store);

        let expected = ExpectedChecksum::parse("5d41402abc4b2a76b9719d911017c592");
        assert!(oracle.exists(&key(), Some(&expected), 5).await.unwrap());
    }

    #[tokio::test]
    async fn truncated_object_with_correct_tag_is_stale() {
        let store = Arc::new(MemoryStore::default());
        store.corrupt_next_puts(1);
        let body = b"hello";
        let digests = ContentDigests::compute(body);
        store
            .put(
                &key(),
                PutRequest {
                    body: Bytes::from_static(body),
                    content_type: "image/png",
                    cache_control: CACHE_CONTROL,
                    content_md5: digests.content_md5(),
                    sha256: digests.sha256_hex(),
                },
            )
            .await
            .unwrap();
        let oracle = ExistenceOracle::new(store);

        let expected = ExpectedChecksum::Sha256(digests.sha256_hex());
        let presence = oracle.probe(&key(), Some(&expected), 5).await.unwrap();
        assert!(matches!(presence, Presence::Stale(ObjectMeta { size: 4, .. })));
    }

    #[tokio::test]
    async fn unrecognized_catalog_checksum_never_counts_as_present() {
        let store = Arc::new(MemoryStore::default());
        store.insert(&key(), b"hello");
        let oracle = ExistenceOracle::new(store);

        let expected = ExpectedChecksum::parse("not-a-digest");
        assert!(!oracle.exists(&key(), Some(&expected), 5).await.unwrap());
        assert!(oracle.exists(&key(), None, 5).await.unwrap());
    }
}
