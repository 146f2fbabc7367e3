//! Output formatting and persistence for daily aggregates.
//!
//! Lines are `key, total, max`: comma-space separated, no header, no
//! quoting. Every field is numeric so no escaping is ever needed.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::trip::DailyAggregate;

pub const DEFAULT_SUFFIX: &str = ".csv";

/// Renders one aggregate as an output line (without the newline).
///
/// Floats always keep a fractional part, so `40` is written as `40.0`.
pub fn format_line(aggregate: &DailyAggregate) -> String {
    format!(
        "{}, {}, {}",
        aggregate.key,
        format_amount(aggregate.daily_total_amount),
        format_amount(aggregate.daily_max_amount)
    )
}

/// Shortest round-trip rendering of `value` with a signed, two-digit
/// exponent outside `[1e-4, 1e16)`: `1e16` is written `1e+16` and
/// `0.00001` is written `1e-05`.
pub fn format_amount(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let debug = format!("{value:?}");
    let Some((mantissa, exponent)) = debug.split_once('e') else {
        return debug;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

/// Path of shard `index` out of `num_shards` for `prefix`.
///
/// `out/daily` with suffix `.csv` gives `out/daily-00000-of-00001.csv`.
pub fn shard_path(prefix: &str, index: usize, num_shards: usize, suffix: &str) -> PathBuf {
    PathBuf::from(format!(
        "{}-{:05}-of-{:05}{}",
        prefix, index, num_shards, suffix
    ))
}

/// Writes the aggregates round-robin across `num_shards` files.
///
/// All shard files are created, even the ones that end up empty, and
/// missing parent directories are created first. Returns the shard paths
/// in index order.
#[tracing::instrument(skip(aggregates), fields(records = aggregates.len()))]
pub fn write_shards(
    prefix: &str,
    suffix: &str,
    num_shards: usize,
    aggregates: &[DailyAggregate],
) -> Result<Vec<PathBuf>> {
    let num_shards = num_shards.max(1);

    if let Some(parent) = Path::new(prefix).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let paths: Vec<PathBuf> = (0..num_shards)
        .map(|index| shard_path(prefix, index, num_shards, suffix))
        .collect();

    let mut writers = Vec::with_capacity(num_shards);
    for path in &paths {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        writers.push(BufWriter::new(file));
    }

    for (i, aggregate) in aggregates.iter().enumerate() {
        writeln!(writers[i % num_shards], "{}", format_line(aggregate))?;
    }

    for (writer, path) in writers.iter_mut().zip(&paths) {
        writer.flush()?;
        debug!(path = %path.display(), "Shard written");
    }

    info!(shards = paths.len(), "Output written");
    Ok(paths)
}
