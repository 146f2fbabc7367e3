//! Read, aggregate, write: one bounded run from source to local files.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use crate::aggregate::aggregate_daily;
use crate::output::{DEFAULT_SUFFIX, write_shards};
use crate::source::TripSource;

/// Where and how the sink writes.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output: String,
    pub suffix: String,
    pub num_shards: usize,
}

impl PipelineOptions {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            suffix: DEFAULT_SUFFIX.to_string(),
            num_shards: 1,
        }
    }

    pub fn with_num_shards(mut self, num_shards: usize) -> Self {
        self.num_shards = num_shards;
        self
    }
}

/// What a finished run produced.
#[derive(Debug, Serialize)]
pub struct PipelineSummary {
    pub trips_read: usize,
    pub days: usize,
    pub files: Vec<PathBuf>,
}

/// Runs the daily aggregation end to end.
///
/// Any source, timestamp or write error aborts the run before the
/// remaining steps execute.
#[tracing::instrument(skip(source), fields(output = %options.output, shards = options.num_shards))]
pub fn run_pipeline<S: TripSource + ?Sized>(
    source: &S,
    options: &PipelineOptions,
) -> Result<PipelineSummary> {
    let trips = source.read_trips()?;
    info!(trips = trips.len(), "Aggregating by pickup day");

    let aggregates = aggregate_daily(&trips)?;
    info!(days = aggregates.len(), "Daily aggregation complete");

    let files = write_shards(
        &options.output,
        &options.suffix,
        options.num_shards,
        &aggregates,
    )?;

    Ok(PipelineSummary {
        trips_read: trips.len(),
        days: aggregates.len(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AggregateError;
    use crate::trip::Trip;
    use std::fs;

    #[test]
    fn test_run_writes_daily_lines() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("daily").to_str().unwrap().to_string();
        let trips = vec![
            Trip::with_pickup("2024-03-05 10:00:00", 42.5),
            Trip::with_pickup("2024-03-07 09:00:00", 10.0),
            Trip::with_pickup("2024-04-05 18:00:00", 7.5),
        ];

        let summary = run_pipeline(&trips, &PipelineOptions::new(output)).unwrap();

        assert_eq!(summary.trips_read, 3);
        assert_eq!(summary.days, 2);
        assert_eq!(summary.files.len(), 1);
        let content = fs::read_to_string(&summary.files[0]).unwrap();
        assert_eq!(content, "5, 50.0, 42.5\n7, 10.0, 10.0\n");
    }

    #[test]
    fn test_bad_timestamp_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("daily").to_str().unwrap().to_string();
        let trips = vec![Trip::with_pickup("2024/03/05", 1.0)];

        let err = run_pipeline(&trips, &PipelineOptions::new(output)).unwrap_err();

        assert!(err.downcast_ref::<AggregateError>().is_some());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
