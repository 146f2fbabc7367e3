use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};

use super::BucketStore;

/// Region that rejects an explicit location constraint on bucket creation.
const DEFAULT_REGION: &str = "us-east-1";

/// [`BucketStore`] backed by `aws-sdk-s3`.
///
/// Construct it once from the loaded AWS configuration and share it; the
/// inner client is cheap to clone and pools its connections.
#[derive(Clone)]
pub struct S3BucketStore {
    client: aws_sdk_s3::Client,
    region: Option<String>,
}

impl S3BucketStore {
    /// Creates a store from the ambient AWS configuration (env vars,
    /// profile, instance role) loaded by `aws_config`.
    ///
    /// `force_path_style` is needed by most S3-compatible endpoints
    /// (MinIO, Ceph, OCI's S3 compatibility API).
    pub fn new(config: &aws_config::SdkConfig, force_path_style: bool) -> Self {
        let s3_config = aws_sdk_s3::config::Builder::from(config)
            .force_path_style(force_path_style)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            region: config.region().map(|r| r.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl BucketStore for S3BucketStore {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .list_buckets()
            .send()
            .await
            .context("S3 ListBuckets failed")?;

        Ok(resp
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut req = self.client.create_bucket().bucket(bucket);

        if let Some(region) = self.region.as_deref().filter(|r| *r != DEFAULT_REGION) {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        req.send()
            .await
            .with_context(|| format!("S3 CreateBucket failed for '{bucket}'"))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .with_context(|| format!("S3 DeleteBucket failed for '{bucket}'"))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.with_context(|| format!("S3 ListObjectsV2 failed for '{bucket}'"))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );
        }

        Ok(keys)
    }

    async fn put_object(&self, bucket: &str, key: &str, body: ByteStream) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("S3 PutObject failed for '{bucket}/{key}'"))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("S3 GetObject failed for '{bucket}/{key}'"))?;
        Ok(resp.body)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("S3 DeleteObject failed for '{bucket}/{key}'"))?;
        Ok(())
    }
}
