//! Bucket lifecycle and file transfer on top of a [`BucketStore`].
//!
//! Every transfer is best-effort: a failing item is logged, recorded in the
//! returned report, and the remaining items still run. Only failures of the
//! bucket listing itself are returned as errors.

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::storage::BucketStore;

/// An item that could not be transferred, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

/// Why a transfer did not start at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    BucketMissing,
    FileMissing(PathBuf),
}

/// Outcome of an upload or download.
#[derive(Debug, Default, Serialize)]
pub struct TransferReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<ItemFailure>,
    pub skipped: Option<SkipReason>,
}

impl TransferReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.succeeded.len()
    }

    /// `true` when the transfer ran and nothing failed.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_none() && self.failed.is_empty()
    }
}

/// Outcome of [`BucketSync::delete_bucket`].
#[derive(Debug, Default, Serialize)]
pub struct DeleteReport {
    pub existed: bool,
    pub objects_deleted: usize,
    pub failed: Vec<ItemFailure>,
    pub bucket_deleted: bool,
}

/// Object count of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub bucket: String,
    pub objects: usize,
}

/// Moves local files into and out of buckets through an injected store.
pub struct BucketSync<S> {
    store: S,
}

impl<S: BucketStore> BucketSync<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        let buckets = self.store.list_buckets().await?;
        for bucket in &buckets {
            info!(bucket = %bucket, "Bucket");
        }
        Ok(buckets)
    }

    /// Object counts for every bucket. A bucket whose listing fails is
    /// logged and left out.
    pub async fn list_bucket_counts(&self) -> Result<Vec<BucketCount>> {
        let mut counts = Vec::new();
        for bucket in self.store.list_buckets().await? {
            match self.store.list_objects(&bucket).await {
                Ok(objects) => {
                    info!(bucket = %bucket, objects = objects.len(), "Bucket object count");
                    counts.push(BucketCount {
                        bucket,
                        objects: objects.len(),
                    });
                }
                Err(e) => error!(bucket = %bucket, error = %e, "Failed to list objects"),
            }
        }
        Ok(counts)
    }

    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let exists = self
            .store
            .list_buckets()
            .await?
            .iter()
            .any(|name| name == bucket);

        if exists {
            debug!(bucket, "Bucket exists");
        } else {
            info!(bucket, "Bucket does not exist");
        }
        Ok(exists)
    }

    /// Number of objects in `bucket`, or `None` if it does not exist.
    pub async fn bucket_details(&self, bucket: &str) -> Result<Option<usize>> {
        if !self.bucket_exists(bucket).await? {
            return Ok(None);
        }
        let objects = self.store.list_objects(bucket).await?;
        info!(bucket, objects = objects.len(), "Bucket details");
        Ok(Some(objects.len()))
    }

    /// Creates `bucket` unless it already exists.
    ///
    /// Returns whether the bucket exists afterwards; a failed create is
    /// logged and reported as `false`.
    #[tracing::instrument(skip(self))]
    pub async fn create_bucket(&self, bucket: &str) -> Result<bool> {
        if self.bucket_exists(bucket).await? {
            info!("Bucket already present, nothing to create");
            return Ok(true);
        }

        match self.store.create_bucket(bucket).await {
            Ok(()) => {
                info!("Created bucket");
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, "Failed to create bucket");
                Ok(false)
            }
        }
    }

    /// Empties `bucket` object by object, then removes it.
    ///
    /// A bucket holding N objects issues exactly N object deletes before the
    /// bucket delete.
    #[tracing::instrument(skip(self))]
    pub async fn delete_bucket(&self, bucket: &str) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        if !self.bucket_exists(bucket).await? {
            return Ok(report);
        }
        report.existed = true;

        let objects = match self.store.list_objects(bucket).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(error = %e, "Could not list objects, deleting bucket as is");
                Vec::new()
            }
        };

        for key in objects {
            match self.store.delete_object(bucket, &key).await {
                Ok(()) => report.objects_deleted += 1,
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to delete object");
                    report.failed.push(ItemFailure {
                        item: key,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        if report.objects_deleted > 0 {
            info!(objects = report.objects_deleted, "Deleted objects");
        } else {
            info!("Bucket is empty, no objects to delete");
        }

        match self.store.delete_bucket(bucket).await {
            Ok(()) => {
                report.bucket_deleted = true;
                info!("Deleted bucket");
            }
            Err(e) => error!(error = %e, "Failed to delete bucket"),
        }

        Ok(report)
    }

    /// Uploads one file as `key`, defaulting to the file name.
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn upload_file(
        &self,
        bucket: &str,
        path: &Path,
        key: Option<&str>,
    ) -> Result<TransferReport> {
        if !path.is_file() {
            warn!("File does not exist or cannot be found");
            return Ok(TransferReport::skipped(SkipReason::FileMissing(
                path.to_path_buf(),
            )));
        }
        if !self.bucket_exists(bucket).await? {
            warn!("Create the bucket before uploading");
            return Ok(TransferReport::skipped(SkipReason::BucketMissing));
        }

        let key = match key {
            Some(key) => key.to_string(),
            None => file_name(path)?,
        };

        let mut report = TransferReport::default();
        self.upload_one(bucket, path, key, &mut report).await;
        Ok(report)
    }

    /// Uploads every regular file directly inside `dir`, keyed by file name.
    ///
    /// An empty directory uploads nothing and is not an error.
    #[tracing::instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn upload_directory(&self, bucket: &str, dir: &Path) -> Result<TransferReport> {
        if !self.bucket_exists(bucket).await? {
            warn!("Create the bucket before uploading");
            return Ok(TransferReport::skipped(SkipReason::BucketMissing));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to read directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            } else {
                debug!(path = %path.display(), "Skipping non-file entry");
            }
        }
        files.sort();

        let mut report = TransferReport::default();
        for path in files {
            match file_name(&path) {
                Ok(key) => self.upload_one(bucket, &path, key, &mut report).await,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Skipping file");
                    report.failed.push(ItemFailure {
                        item: path.display().to_string(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        if report.count() == 0 && report.failed.is_empty() {
            info!("Empty directory, no files uploaded");
        } else {
            info!(
                uploaded = report.count(),
                failed = report.failed.len(),
                "Finished uploading directory"
            );
        }
        Ok(report)
    }

    /// Uploads exactly the listed files, each keyed by its file name.
    ///
    /// A listed file that is missing is recorded as a failure and the rest
    /// still upload.
    #[tracing::instrument(skip(self, paths), fields(files = paths.len()))]
    pub async fn upload_files(&self, bucket: &str, paths: &[PathBuf]) -> Result<TransferReport> {
        if !self.bucket_exists(bucket).await? {
            warn!("Create the bucket before uploading");
            return Ok(TransferReport::skipped(SkipReason::BucketMissing));
        }

        let mut report = TransferReport::default();
        for path in paths {
            let key = if path.is_file() {
                file_name(path)
            } else {
                Err(anyhow::anyhow!("{} is not a file", path.display()))
            };
            match key {
                Ok(key) => self.upload_one(bucket, path, key, &mut report).await,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Skipping file");
                    report.failed.push(ItemFailure {
                        item: path.display().to_string(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        info!(
            uploaded = report.count(),
            failed = report.failed.len(),
            "Finished uploading files"
        );
        Ok(report)
    }

    /// Downloads every object of `bucket` into `dir`, creating it if needed.
    #[tracing::instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn download_bucket(&self, bucket: &str, dir: &Path) -> Result<TransferReport> {
        ensure_dir(dir).await?;

        let keys = self.store.list_objects(bucket).await?;
        info!(objects = keys.len(), "Downloading bucket");

        let mut report = TransferReport::default();
        for key in keys {
            self.download_one(bucket, dir, key, &mut report).await;
        }

        info!(
            downloaded = report.count(),
            failed = report.failed.len(),
            "Download finished"
        );
        Ok(report)
    }

    /// Downloads a single object to `dir/<key>`.
    #[tracing::instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn download_object(
        &self,
        bucket: &str,
        dir: &Path,
        key: &str,
    ) -> Result<TransferReport> {
        ensure_dir(dir).await?;

        let mut report = TransferReport::default();
        self.download_one(bucket, dir, key.to_string(), &mut report)
            .await;
        Ok(report)
    }

    async fn upload_one(&self, bucket: &str, path: &Path, key: String, report: &mut TransferReport) {
        info!(key = %key, "Uploading");
        let result: Result<()> = async {
            let body = ByteStream::from_path(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            self.store.put_object(bucket, &key, body).await
        }
        .await;

        match result {
            Ok(()) => report.succeeded.push(key),
            Err(e) => {
                error!(key = %key, error = %e, "Failed to upload file");
                report.failed.push(ItemFailure {
                    item: key,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    async fn download_one(&self, bucket: &str, dir: &Path, key: String, report: &mut TransferReport) {
        info!(key = %key, "Downloading object");
        let result = match local_path(dir, &key) {
            Some(dest) => self.write_object(bucket, &key, &dest).await,
            None => Err(anyhow::anyhow!("object key does not map to a path under the target directory")),
        };

        match result {
            Ok(bytes) => {
                debug!(key = %key, bytes, "Object written");
                report.succeeded.push(key);
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to download object");
                report.failed.push(ItemFailure {
                    item: key,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    /// Streams an object body to `dest` chunk by chunk.
    async fn write_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64> {
        let mut body = self.store.get_object(bucket, key).await?;
        copy_to_file(&mut body, dest).await
    }
}

/// A body that yields its bytes in chunks.
trait ChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

impl ChunkSource for ByteStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.try_next().await?)
    }
}

/// Writes every chunk of `source` to `dest`. If the body or the write fails
/// partway, the partial file is removed before the error is returned.
async fn copy_to_file(source: &mut impl ChunkSource, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("failed to create {}", dest.display()))?;

    let result: Result<u64> = async {
        let mut written = 0u64;
        while let Some(chunk) = source.next_chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
    .await;

    if result.is_err() {
        drop(file);
        if let Err(e) = tokio::fs::remove_file(dest).await {
            warn!(path = %dest.display(), error = %e, "Could not remove partial download");
        }
    }
    result
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

/// Joins `key` under `dir`, refusing keys that would escape it.
fn local_path(dir: &Path, key: &str) -> Option<PathBuf> {
    let relative = Path::new(key);
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    (plain && !key.is_empty()).then(|| dir.join(relative))
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await? {
        debug!(dir = %dir.display(), "Directory already exists");
    } else {
        info!(dir = %dir.display(), "Creating directory");
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}
