use crate::error::AggregateError;
use crate::trip::{DailyAggregate, Trip};
use chrono::{Datelike, NaiveDateTime};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Layout of `tpep_pickup` / `tpep_dropoff` as rendered by the source query.
pub static PICKUP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Extracts the day of month from a pickup timestamp.
///
/// Only the day survives: `2024-01-05 08:00:00` and `2024-02-05 08:00:00`
/// both map to `5`.
pub fn day_of_month(timestamp: &str) -> Result<u32, AggregateError> {
    NaiveDateTime::parse_from_str(timestamp, PICKUP_FORMAT)
        .map(|pickup| pickup.day())
        .map_err(|source| AggregateError::Timestamp {
            value: timestamp.to_string(),
            source,
        })
}

/// Running sum and max of `total_amount` for one day.
///
/// The sum is kept in whole cents so that it does not depend on the order
/// in which trips are folded or partials are merged. Amounts are rounded to
/// the nearest cent on the way in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyAccumulator {
    total_cents: i64,
    max: f64,
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

impl DailyAccumulator {
    pub fn new(amount: f64) -> Self {
        Self {
            total_cents: to_cents(amount),
            max: amount,
        }
    }

    pub fn add(&mut self, amount: f64) {
        self.total_cents += to_cents(amount);
        self.max = self.max.max(amount);
    }

    /// Folds another partial result for the same day into this one.
    pub fn merge(&mut self, other: DailyAccumulator) {
        self.total_cents += other.total_cents;
        self.max = self.max.max(other.max);
    }

    pub fn total(&self) -> f64 {
        self.total_cents as f64 / 100.0
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

type Partial = HashMap<u32, DailyAccumulator>;

fn merge_partials(mut left: Partial, right: Partial) -> Partial {
    for (key, acc) in right {
        left.entry(key)
            .and_modify(|existing| existing.merge(acc))
            .or_insert(acc);
    }
    left
}

/// Groups trips by pickup day of month and computes the daily total and
/// maximum of `total_amount`.
///
/// Trips are folded into per-worker partial maps on the rayon pool and the
/// partials are merged afterwards. The first unparseable pickup timestamp
/// aborts the whole aggregation. Results come back in ascending key order.
pub fn aggregate_daily(trips: &[Trip]) -> Result<Vec<DailyAggregate>, AggregateError> {
    let groups = trips
        .par_iter()
        .try_fold(Partial::new, |mut partial, trip| {
            let key = day_of_month(&trip.tpep_pickup)?;
            partial
                .entry(key)
                .and_modify(|acc| acc.add(trip.total_amount))
                .or_insert_with(|| DailyAccumulator::new(trip.total_amount));
            Ok::<_, AggregateError>(partial)
        })
        .try_reduce(Partial::new, |left, right| {
            Ok::<_, AggregateError>(merge_partials(left, right))
        })?;

    let ordered: BTreeMap<u32, DailyAccumulator> = groups.into_iter().collect();

    Ok(ordered
        .into_iter()
        .map(|(key, acc)| DailyAggregate {
            key,
            daily_total_amount: acc.total(),
            daily_max_amount: acc.max(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trips(rows: &[(&str, f64)]) -> Vec<Trip> {
        rows.iter()
            .map(|(pickup, amount)| Trip::with_pickup(pickup, *amount))
            .collect()
    }

    #[test]
    fn test_day_of_month() {
        assert_eq!(day_of_month("2024-03-05 10:00:00").unwrap(), 5);
        assert_eq!(day_of_month("2019-12-31 23:59:59").unwrap(), 31);
    }

    #[test]
    fn test_day_of_month_rejects_other_layouts() {
        for bad in ["2024-03-05", "05/03/2024 10:00:00", "2024-03-05T10:00:00", ""] {
            let err = day_of_month(bad).unwrap_err();
            let AggregateError::Timestamp { value, .. } = err;
            assert_eq!(value, bad);
        }
    }

    #[test]
    fn test_single_record() {
        let out = aggregate_daily(&trips(&[("2024-03-05 10:00:00", 42.50)])).unwrap();
        assert_eq!(
            out,
            vec![DailyAggregate {
                key: 5,
                daily_total_amount: 42.50,
                daily_max_amount: 42.50,
            }]
        );
    }

    #[test]
    fn test_sum_and_max_per_day() {
        let out = aggregate_daily(&trips(&[
            ("2024-03-05 10:00:00", 10.25),
            ("2024-03-06 11:00:00", 7.0),
            ("2024-03-05 12:30:00", 30.5),
            ("2024-03-05 23:59:59", 1.25),
        ]))
        .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].key, 5);
        assert_eq!(out[0].daily_total_amount, 42.0);
        assert_eq!(out[0].daily_max_amount, 30.5);
        assert_eq!(out[1].key, 6);
        assert_eq!(out[1].daily_total_amount, 7.0);
        assert_eq!(out[1].daily_max_amount, 7.0);
    }

    #[test]
    fn test_different_months_share_day_key() {
        let out = aggregate_daily(&trips(&[
            ("2024-01-05 08:00:00", 20.0),
            ("2024-02-05 09:00:00", 5.5),
        ]))
        .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, 5);
        assert_eq!(out[0].daily_total_amount, 25.5);
        assert_eq!(out[0].daily_max_amount, 20.0);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut rows = Vec::new();
        for i in 0..500u32 {
            let day = i % 28 + 1;
            let amount = f64::from(i % 37) * 0.25;
            rows.push((format!("2024-04-{:02} 12:00:00", day), amount));
        }
        let forward: Vec<Trip> = rows
            .iter()
            .map(|(p, a)| Trip::with_pickup(p, *a))
            .collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(
            aggregate_daily(&forward).unwrap(),
            aggregate_daily(&reversed).unwrap()
        );
    }

    #[test]
    fn test_cent_amounts_sum_the_same_in_any_order() {
        let count = 20_000u32;
        let rows: Vec<(String, f64)> = (0..count)
            .map(|i| {
                let day = i % 3 + 1;
                let cents = i64::from(i.wrapping_mul(7919) % 1_000_000) + 1;
                (format!("2024-05-{:02} 08:15:00", day), cents as f64 / 100.0)
            })
            .collect();
        let forward: Vec<Trip> = rows
            .iter()
            .map(|(p, a)| Trip::with_pickup(p, *a))
            .collect();

        // 7001 is coprime with 20000, so this visits every index exactly once.
        let shuffled: Vec<Trip> = (0..forward.len())
            .map(|i| forward[i * 7001 % forward.len()].clone())
            .collect();

        let expected_cents: i64 = rows
            .iter()
            .filter(|(p, _)| p.starts_with("2024-05-01"))
            .map(|(_, a)| (a * 100.0).round() as i64)
            .sum();

        let a = aggregate_daily(&forward).unwrap();
        let b = aggregate_daily(&shuffled).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].key, 1);
        assert_eq!(a[0].daily_total_amount, expected_cents as f64 / 100.0);
    }

    #[test]
    fn test_bad_timestamp_aborts() {
        let result = aggregate_daily(&trips(&[
            ("2024-03-05 10:00:00", 1.0),
            ("not a timestamp", 2.0),
        ]));
        assert!(matches!(
            result,
            Err(AggregateError::Timestamp { ref value, .. }) if value == "not a timestamp"
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate_daily(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_accumulator_merge_is_commutative() {
        let mut a = DailyAccumulator::new(3.0);
        a.add(4.5);
        let mut b = DailyAccumulator::new(9.0);
        b.add(0.5);

        let mut ab = a;
        ab.merge(b);
        let mut ba = b;
        ba.merge(a);

        assert_eq!(ab, ba);
        assert_eq!(ab.total(), 17.0);
        assert_eq!(ab.max(), 9.0);
    }
}
