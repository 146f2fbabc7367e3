//! Object-storage access.
//!
//! [`BucketStore`] is the async trait the bucket synchronizer talks to.
//! [`S3BucketStore`] implements it against any S3-compatible service.
//! [`MemoryBucketStore`] keeps everything in process, for tests and dry runs.

mod memory;
mod s3;

pub use memory::MemoryBucketStore;
pub use s3::S3BucketStore;

use anyhow::Result;
use aws_sdk_s3::primitives::ByteStream;

/// One-to-one wrappers over the storage service's bucket and object calls.
///
/// Implementations do not retry; every call maps to a single request (or a
/// single paginated listing).
#[async_trait::async_trait]
pub trait BucketStore: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<String>>;
    async fn create_bucket(&self, bucket: &str) -> Result<()>;
    /// Removes an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>>;
    async fn put_object(&self, bucket: &str, key: &str, body: ByteStream) -> Result<()>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ByteStream>;
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}
