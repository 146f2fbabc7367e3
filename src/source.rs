//! Connectors that turn a tabular query result into [`Trip`] records.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::trip::{Trip, TripRow};

/// Row cap of the upstream extraction query.
pub const DEFAULT_ROW_LIMIT: usize = 50_000;

/// A bounded supplier of trip records.
pub trait TripSource {
    fn read_trips(&self) -> Result<Vec<Trip>>;
}

impl TripSource for Vec<Trip> {
    fn read_trips(&self) -> Result<Vec<Trip>> {
        Ok(self.clone())
    }
}

/// Reads a headered CSV export of the `yellow_tripdata_trip` query.
///
/// Column names must match the [`Trip`] field names. Empty
/// `passenger_count` and `store_and_fwd_flag` cells take their defaults.
pub struct CsvTripSource {
    path: PathBuf,
    limit: usize,
}

impl CsvTripSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Caps the number of rows read; `0` reads everything.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl TripSource for CsvTripSource {
    #[tracing::instrument(skip(self), fields(path = %self.path.display(), limit = self.limit))]
    fn read_trips(&self) -> Result<Vec<Trip>> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open trip source {}", self.path.display()))?;
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

        let mut trips = Vec::new();
        for (index, result) in rdr.deserialize::<TripRow>().enumerate() {
            if self.limit > 0 && index >= self.limit {
                debug!(limit = self.limit, "Row limit reached");
                break;
            }
            let row = result.with_context(|| format!("invalid trip row {}", index + 1))?;
            trips.push(Trip::from(row));
        }

        info!(rows = trips.len(), "Trips loaded");
        Ok(trips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HEADER: &str = "tpep_pickup,tpep_dropoff,passenger_count,trip_distance,store_and_fwd_flag,payment_type,fare_amount,extra,mta_tax,tip_amount,total_amount";

    fn write_csv(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("trips.csv");
        fs::write(&path, format!("{HEADER}\n{body}")).unwrap();
        path
    }

    #[test]
    fn test_reads_rows_and_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "2024-03-05 10:00:00,2024-03-05 10:12:00,,1.2,,1,8.0,0.5,0.5,1.0,10.0\n\
             2024-03-06 11:00:00,2024-03-06 11:30:00,2,5.0,N,2,20.0,0.0,0.5,0.0,20.5\n",
        );

        let trips = CsvTripSource::new(&path).read_trips().unwrap();

        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].passenger_count, 1);
        assert_eq!(trips[0].store_and_fwd_flag, "0");
        assert_eq!(trips[0].total_amount, 10.0);
        assert_eq!(trips[1].passenger_count, 2);
        assert_eq!(trips[1].store_and_fwd_flag, "N");
        assert_eq!(trips[1].tpep_pickup, "2024-03-06 11:00:00");
    }

    #[test]
    fn test_limit_caps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (1..=5)
            .map(|d| format!("2024-03-0{d} 10:00:00,2024-03-0{d} 10:10:00,1,1.0,N,1,5.0,0,0,0,5.0\n"))
            .collect();
        let path = write_csv(&dir, &body);

        assert_eq!(CsvTripSource::new(&path).with_limit(3).read_trips().unwrap().len(), 3);
        assert_eq!(CsvTripSource::new(&path).with_limit(0).read_trips().unwrap().len(), 5);
    }

    #[test]
    fn test_malformed_row_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "2024-03-05 10:00:00,2024-03-05 10:12:00,1,abc,N,1,8.0,0.5,0.5,1.0,10.0\n",
        );

        let err = CsvTripSource::new(&path).read_trips().unwrap_err();
        assert!(err.to_string().contains("invalid trip row 1"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = CsvTripSource::new("/nonexistent/trips.csv").read_trips();
        assert!(result.is_err());
    }
}
