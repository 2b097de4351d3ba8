//! In-memory bucket with fault injection for driver and worker tests.

use crate::{
    errors::{RemoteError, RemoteResult},
    models::asset::RemoteKey,
    services::{
        checksum::ContentDigests,
        object_store::{ObjectMeta, ObjectStore, PutRequest},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<RemoteKey, (Bytes, ObjectMeta)>>,
    head_failures: AtomicU32,
    head_rejections: AtomicU32,
    heads: AtomicU32,
    put_failures: AtomicU32,
    corrupt_puts: AtomicU32,
    puts: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    put_delay: Duration,
}

impl MemoryStore {
    pub fn with_put_delay(delay: Duration) -> Self {
        Self {
            put_delay: delay,
            ..Self::default()
        }
    }

    pub fn insert(&self, key: &RemoteKey, body: &[u8]) {
        let digests = ContentDigests::compute(body);
        let meta = ObjectMeta {
            size: digests.size,
            etag: Some(format!("\"{}\"", digests.md5_hex())),
            etag_is_md5: true,
            sha256: Some(digests.sha256_hex()),
        };
        self.objects
            .lock()
            .unwrap()
            .insert(key.clone(), (Bytes::copy_from_slice(body), meta));
    }

    pub fn body(&self, key: &RemoteKey) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).map(|(b, _)| b.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn fail_next_heads(&self, n: u32) {
        self.head_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` heads reject the key, as a backend with stricter key
    /// rules than the resolver would.
    pub fn reject_next_heads(&self, n: u32) {
        self.head_rejections.store(n, Ordering::SeqCst);
    }

    pub fn head_count(&self) -> u32 {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn fail_next_puts(&self, n: u32) {
        self.put_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` puts store a truncated body, as a short upload would.
    pub fn corrupt_next_puts(&self, n: u32) {
        self.corrupt_puts.store(n, Ordering::SeqCst);
    }

    pub fn put_count(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head(&self, key: &RemoteKey) -> RemoteResult<Option<ObjectMeta>> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.head_rejections) {
            return Err(RemoteError::InvalidKey {
                bucket: key.bucket.clone(),
                key: key.key.clone(),
            });
        }
        if Self::take(&self.head_failures) {
            return Err(RemoteError::unavailable(&key.bucket, &key.key, "injected probe failure"));
        }
        Ok(self.objects.lock().unwrap().get(key).map(|(_, m)| m.clone()))
    }

    async fn put(&self, key: &RemoteKey, request: PutRequest) -> RemoteResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.puts.fetch_add(1, Ordering::SeqCst);

        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }

        let result = if Self::take(&self.put_failures) {
            Err(RemoteError::unavailable(&key.bucket, &key.key, "injected put failure"))
        } else {
            let mut body = request.body.clone();
            if Self::take(&self.corrupt_puts) && !body.is_empty() {
                body.truncate(body.len() - 1);
            }
            let meta = ObjectMeta {
                size: body.len() as u64,
                etag: Some(format!("\"{}\"", ContentDigests::compute(&body).md5_hex())),
                etag_is_md5: true,
                sha256: Some(request.sha256),
            };
            self.objects.lock().unwrap().insert(key.clone(), (body, meta));
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
