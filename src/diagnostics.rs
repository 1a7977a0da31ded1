//! Time-interval statistics over a recorded track.
//!
//! Read-only: used to judge the sampling rate of a track before or after
//! culling. Only strictly positive gaps between consecutive timestamps count;
//! zero or negative gaps (duplicates, out-of-order records) are discarded.

use std::fmt;

use chrono::{DateTime, FixedOffset, TimeDelta};

use crate::TrackPoint;

/// Default upper bound of a "short" interval.
pub const DEFAULT_SHORT_INTERVAL_SECONDS: f64 = 60.0;

/// Configuration for interval statistics.
#[derive(Debug, Clone)]
pub struct IntervalConfig {
    /// Intervals at or below this many seconds count as short.
    /// Default: 60.0
    pub short_interval_seconds: f64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            short_interval_seconds: DEFAULT_SHORT_INTERVAL_SECONDS,
        }
    }
}

/// Summary of the gaps between consecutive timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalStats {
    /// Number of timestamps examined
    pub point_count: usize,
    /// Number of positive intervals
    pub interval_count: usize,
    pub min_seconds: f64,
    pub max_seconds: f64,
    pub mean_seconds: f64,
    pub median_seconds: f64,
    pub short_interval_seconds: f64,
    /// Fraction (0.0-1.0) of intervals at or below `short_interval_seconds`
    pub short_fraction: f64,
}

impl IntervalStats {
    pub fn short_percent(&self) -> f64 {
        self.short_fraction * 100.0
    }
}

impl fmt::Display for IntervalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total points: {}", self.point_count)?;
        writeln!(f, "Min interval: {}s", self.min_seconds)?;
        writeln!(f, "Max interval: {}s", self.max_seconds)?;
        writeln!(f, "Mean interval: {:.2}s", self.mean_seconds)?;
        writeln!(f, "Median interval: {:.2}s", self.median_seconds)?;
        write!(
            f,
            "Intervals <= {}s: {:.1}%",
            self.short_interval_seconds,
            self.short_percent()
        )
    }
}

/// Compute interval statistics over timestamps in the given order.
///
/// Returns `None` when there is no positive interval, e.g. fewer than two
/// timestamps.
///
/// ```
/// use track_merger::{interval_stats, parse_timestamp, IntervalConfig};
///
/// let stamps: Vec<_> = ["2026-01-11T10:00:00Z", "2026-01-11T10:00:10Z", "2026-01-11T10:01:10Z"]
///     .iter()
///     .map(|s| parse_timestamp(s).unwrap())
///     .collect();
/// let stats = interval_stats(&stamps, &IntervalConfig::default()).unwrap();
/// assert_eq!(stats.mean_seconds, 35.0);
/// ```
pub fn interval_stats(
    timestamps: &[DateTime<FixedOffset>],
    config: &IntervalConfig,
) -> Option<IntervalStats> {
    let mut deltas: Vec<f64> = timestamps
        .windows(2)
        .map(|w| gap_seconds(w[1] - w[0]))
        .filter(|&d| d > 0.0)
        .collect();

    if deltas.is_empty() {
        return None;
    }

    let n = deltas.len();
    let mean_seconds = deltas.iter().sum::<f64>() / n as f64;
    let short = deltas
        .iter()
        .filter(|&&d| d <= config.short_interval_seconds)
        .count();

    deltas.sort_by(f64::total_cmp);
    let median_seconds = if n % 2 == 1 {
        deltas[n / 2]
    } else {
        (deltas[n / 2 - 1] + deltas[n / 2]) / 2.0
    };

    Some(IntervalStats {
        point_count: timestamps.len(),
        interval_count: n,
        min_seconds: deltas[0],
        max_seconds: deltas[n - 1],
        mean_seconds,
        median_seconds,
        short_interval_seconds: config.short_interval_seconds,
        short_fraction: short as f64 / n as f64,
    })
}

fn gap_seconds(delta: TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

/// [`interval_stats`] over the timestamps of a track.
pub fn track_interval_stats(points: &[TrackPoint], config: &IntervalConfig) -> Option<IntervalStats> {
    let timestamps: Vec<_> = points.iter().map(|p| p.timestamp).collect();
    interval_stats(&timestamps, config)
}
