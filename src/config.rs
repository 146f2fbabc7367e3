//! Environment-driven settings for the storage side.
//!
//! Read after `dotenvy` has loaded any `.env` file. AWS region, credentials
//! and endpoint (`AWS_ENDPOINT_URL`) are resolved separately by `aws-config`.

use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_BUCKET: &str = "bucket-apache-beam";

/// Where finished output is pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    /// `TAXI_ETL_BUCKET`
    pub bucket: String,
    /// `TAXI_ETL_UPLOAD_DIR`; when unset, `run` uploads only the shards it wrote.
    pub upload_dir: Option<PathBuf>,
    /// `S3_FORCE_PATH_STYLE`
    pub force_path_style: bool,
}

impl StorageSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bucket = lookup("TAXI_ETL_BUCKET")
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_BUCKET.to_string());

        let upload_dir = lookup("TAXI_ETL_UPLOAD_DIR")
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);

        let force_path_style = match lookup("S3_FORCE_PATH_STYLE") {
            Some(value) => parse_bool(&value)
                .with_context(|| format!("S3_FORCE_PATH_STYLE must be a boolean, got '{value}'"))?,
            None => false,
        };

        Ok(Self {
            bucket,
            upload_dir,
            force_path_style,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<StorageSettings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StorageSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.bucket, DEFAULT_BUCKET);
        assert_eq!(s.upload_dir, None);
        assert!(!s.force_path_style);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("TAXI_ETL_BUCKET", "trips"),
            ("TAXI_ETL_UPLOAD_DIR", "/data/out"),
            ("S3_FORCE_PATH_STYLE", "true"),
        ])
        .unwrap();
        assert_eq!(s.bucket, "trips");
        assert_eq!(s.upload_dir, Some(PathBuf::from("/data/out")));
        assert!(s.force_path_style);
    }

    #[test]
    fn test_bad_bool_is_an_error() {
        assert!(settings(&[("S3_FORCE_PATH_STYLE", "maybe")]).is_err());
    }
}
