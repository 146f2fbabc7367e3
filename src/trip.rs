//! Record types flowing through the pipeline.

use serde::{Deserialize, Serialize};

/// A single yellow-cab trip as read from the source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub tpep_pickup: String,
    pub tpep_dropoff: String,
    pub passenger_count: i64,
    pub trip_distance: f64,
    pub store_and_fwd_flag: String,
    pub payment_type: i64,
    pub fare_amount: f64,
    pub extra: f64,
    pub mta_tax: f64,
    pub tip_amount: f64,
    pub total_amount: f64,
}

/// A row exactly as it appears in the source, before defaults are applied.
///
/// `passenger_count` and `store_and_fwd_flag` are nullable upstream; the
/// conversion into [`Trip`] fills them with `1` and `"0"`.
#[derive(Debug, Deserialize)]
pub struct TripRow {
    pub tpep_pickup: String,
    pub tpep_dropoff: String,
    pub passenger_count: Option<i64>,
    pub trip_distance: f64,
    pub store_and_fwd_flag: Option<String>,
    pub payment_type: i64,
    pub fare_amount: f64,
    pub extra: f64,
    pub mta_tax: f64,
    pub tip_amount: f64,
    pub total_amount: f64,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Trip {
            tpep_pickup: row.tpep_pickup,
            tpep_dropoff: row.tpep_dropoff,
            passenger_count: row.passenger_count.unwrap_or(1),
            trip_distance: row.trip_distance,
            store_and_fwd_flag: row
                .store_and_fwd_flag
                .filter(|flag| !flag.is_empty())
                .unwrap_or_else(|| "0".to_string()),
            payment_type: row.payment_type,
            fare_amount: row.fare_amount,
            extra: row.extra,
            mta_tax: row.mta_tax,
            tip_amount: row.tip_amount,
            total_amount: row.total_amount,
        }
    }
}

#[cfg(test)]
impl Trip {
    /// Builds a trip carrying only the fields the daily aggregation reads.
    pub(crate) fn with_pickup(pickup: &str, total_amount: f64) -> Self {
        Trip {
            tpep_pickup: pickup.to_string(),
            tpep_dropoff: pickup.to_string(),
            passenger_count: 1,
            trip_distance: 0.0,
            store_and_fwd_flag: "0".to_string(),
            payment_type: 1,
            fare_amount: total_amount,
            extra: 0.0,
            mta_tax: 0.0,
            tip_amount: 0.0,
            total_amount,
        }
    }
}

/// Per-day summary produced by the aggregation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAggregate {
    /// Day of month (1..=31) of the pickup timestamp. Year and month are
    /// discarded, so the 5th of January and the 5th of February share a key.
    pub key: u32,
    pub daily_total_amount: f64,
    pub daily_max_amount: f64,
}
