use anyhow::{Result, anyhow, bail};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::BucketStore;

type Buckets = BTreeMap<String, BTreeMap<String, Bytes>>;

/// In-process [`BucketStore`].
///
/// Mirrors the service rules the synchronizer relies on: creating an
/// existing bucket fails, and only empty buckets can be deleted. Individual
/// keys can be marked to reject uploads so partial failures can be staged.
#[derive(Default)]
pub struct MemoryBucketStore {
    buckets: Mutex<Buckets>,
    rejected_keys: Mutex<HashSet<String>>,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future `put_object` for `key` fail.
    pub fn reject_uploads_of(&self, key: &str) {
        if let Ok(mut keys) = self.rejected_keys.lock() {
            keys.insert(key.to_string());
        }
    }

    /// Returns a copy of an object body, if present.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let buckets = self.buckets.lock().ok()?;
        buckets.get(bucket)?.get(key).cloned()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Buckets>> {
        self.buckets
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait::async_trait]
impl BucketStore for MemoryBucketStore {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.lock()?;
        if buckets.contains_key(bucket) {
            bail!("bucket '{bucket}' already exists");
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.lock()?;
        match buckets.get(bucket) {
            None => bail!("bucket '{bucket}' does not exist"),
            Some(objects) if !objects.is_empty() => {
                bail!("bucket '{bucket}' is not empty ({} objects)", objects.len())
            }
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let buckets = self.lock()?;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| anyhow!("bucket '{bucket}' does not exist"))?;
        Ok(objects.keys().cloned().collect())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: ByteStream) -> Result<()> {
        let rejected = self
            .rejected_keys
            .lock()
            .map(|keys| keys.contains(key))
            .unwrap_or(false);
        if rejected {
            bail!("upload of '{key}' rejected");
        }

        let data = body.collect().await?.into_bytes();

        let mut buckets = self.lock()?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| anyhow!("bucket '{bucket}' does not exist"))?;
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        let data = self
            .lock()?
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| anyhow!("object '{bucket}/{key}' not found"))?;
        Ok(ByteStream::from(data))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut buckets = self.lock()?;
        let removed = buckets
            .get_mut(bucket)
            .and_then(|objects| objects.remove(key));
        match removed {
            Some(_) => Ok(()),
            None => bail!("object '{bucket}/{key}' not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryBucketStore::new();
        store.create_bucket("b").await.unwrap();
        store
            .put_object("b", "k", ByteStream::from_static(b"hello"))
            .await
            .unwrap();

        let body = store.get_object("b", "k").await.unwrap();
        let data = body.collect().await.unwrap().into_bytes();
        assert_eq!(&data[..], b"hello");
        assert_eq!(store.list_objects("b").await.unwrap(), vec!["k"]);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = MemoryBucketStore::new();
        store.create_bucket("b").await.unwrap();
        assert!(store.create_bucket("b").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_non_empty_bucket_fails() {
        let store = MemoryBucketStore::new();
        store.create_bucket("b").await.unwrap();
        store
            .put_object("b", "k", ByteStream::from_static(b"x"))
            .await
            .unwrap();

        assert!(store.delete_bucket("b").await.is_err());
        store.delete_object("b", "k").await.unwrap();
        store.delete_bucket("b").await.unwrap();
        assert!(store.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_key() {
        let store = MemoryBucketStore::new();
        store.create_bucket("b").await.unwrap();
        store.reject_uploads_of("bad.csv");

        let result = store
            .put_object("b", "bad.csv", ByteStream::from_static(b"x"))
            .await;
        assert!(result.is_err());
        assert!(store.object("b", "bad.csv").is_none());
    }
}
