//! Synthetic point generation.
//!
//! Points are addressed by `(series index, point index)`. Field values are a pure function
//! of that coordinate so that a series looks the same across runs; the only
//! non-deterministic input is the wall clock when no time span is configured.

use crate::config::RunConfig;
use crate::series::{SeriesKey, SeriesSpace};
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::sync::Arc;

/// A single generated point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    pub series: SeriesKey,
    pub series_index: u64,
    pub point_index: u64,
    /// Nanoseconds since the Unix epoch
    pub timestamp: i64,
    pub fields: Vec<u64>,
}

impl Point {
    /// Appends this point as one line of line protocol (no trailing newline).
    pub fn encode(&self, space: &SeriesSpace, buf: &mut String) {
        space.write_key(&self.series, buf);
        for (i, value) in self.fields.iter().enumerate() {
            let sep = if i == 0 { ' ' } else { ',' };
            let _ = write!(buf, "{sep}v{i}={value}");
        }
        let _ = write!(buf, " {}", self.timestamp);
    }
}

/// Field value of every point generated on a dry run.
const DRY_RUN_VALUE: u64 = 0;

/// How timestamps are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timing {
    /// Wall clock at generation time
    Now,
    /// `start + point_index * step`
    Spread { start_ns: i64, step_ns: i64 },
}

/// Produces points for coordinates of the series space.
#[derive(Debug, Clone)]
pub struct PointGenerator {
    space: Arc<SeriesSpace>,
    fields: usize,
    timing: Timing,
    min_value: u64,
    value_range: u64,
    dry_run: bool,
}

impl PointGenerator {
    /// `run_start` anchors timestamps when a time span is set but no start time is.
    pub fn new(config: &RunConfig, space: Arc<SeriesSpace>, run_start: DateTime<Utc>) -> Self {
        let timing = if config.time_span.is_zero() {
            Timing::Now
        } else {
            let start = config.start_time.unwrap_or(run_start);
            let step = config.time_span.as_nanos() / u128::from(config.points_per_series.max(1));
            Timing::Spread {
                start_ns: start.timestamp_nanos_opt().unwrap_or(0),
                step_ns: i64::try_from(step).unwrap_or(i64::MAX),
            }
        };

        let width = config.field_size.clamp(1, crate::config::MAX_FIELD_SIZE) as u32;
        let max_value = 10u64.pow(width) - 1;
        let min_value = if width == 1 { 0 } else { 10u64.pow(width - 1) };

        Self {
            space,
            fields: config.fields_per_point,
            timing,
            min_value,
            value_range: max_value - min_value + 1,
            dry_run: config.dry_run,
        }
    }

    pub fn space(&self) -> &Arc<SeriesSpace> {
        &self.space
    }

    /// Generates the point at `(series_index, point_index)`.
    pub fn point(&self, series_index: u64, point_index: u64) -> Point {
        let fields = (0..self.fields)
            .map(|field| self.field_value(series_index, point_index, field))
            .collect();

        Point {
            series: self.space.key(series_index),
            series_index,
            point_index,
            timestamp: self.timestamp(point_index),
            fields,
        }
    }

    /// Timestamp in nanoseconds for the given point index.
    pub fn timestamp(&self, point_index: u64) -> i64 {
        match self.timing {
            Timing::Now => Utc::now().timestamp_nanos_opt().unwrap_or(0),
            Timing::Spread { start_ns, step_ns } => {
                let offset = (point_index as i64).saturating_mul(step_ns);
                start_ns.saturating_add(offset)
            }
        }
    }

    /// Field value with exactly `field_size` decimal digits, or a constant on dry runs.
    pub fn field_value(&self, series_index: u64, point_index: u64, field: usize) -> u64 {
        if self.dry_run {
            return DRY_RUN_VALUE;
        }
        let seed = series_index
            ^ point_index.rotate_left(21)
            ^ (field as u64).rotate_left(42);
        self.min_value + mix64(seed) % self.value_range
    }
}

/// SplitMix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn generator(config: &RunConfig) -> PointGenerator {
        let run_start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        PointGenerator::new(config, Arc::new(SeriesSpace::new(config)), run_start)
    }

    #[test]
    fn test_field_width() {
        for field_size in [1, 2, 5, 18] {
            let config = RunConfig {
                field_size,
                fields_per_point: 3,
                ..Default::default()
            };
            let gen = generator(&config);
            for series in 0..50 {
                for p in 0..5 {
                    for value in gen.point(series, p).fields {
                        assert_eq!(value.to_string().len(), field_size, "value {value}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_values_are_deterministic() {
        let config = RunConfig {
            field_size: 6,
            fields_per_point: 4,
            ..Default::default()
        };
        let a = generator(&config);
        let b = generator(&config);
        assert_eq!(a.point(17, 3).fields, b.point(17, 3).fields);
        assert_ne!(a.point(17, 3).fields, a.point(18, 3).fields);
    }

    #[test]
    fn test_timestamps_spread_over_span() {
        let config = RunConfig {
            points_per_series: 4,
            time_span: Duration::from_secs(40),
            ..Default::default()
        };
        let gen = generator(&config);
        let base = 1_700_000_000_000_000_000i64;
        assert_eq!(gen.timestamp(0), base);
        assert_eq!(gen.timestamp(1), base + 10_000_000_000);
        assert_eq!(gen.timestamp(3), base + 30_000_000_000);
    }

    #[test]
    fn test_start_time_overrides_run_start() {
        let start = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let config = RunConfig {
            points_per_series: 2,
            time_span: Duration::from_secs(2),
            start_time: Some(start),
            ..Default::default()
        };
        let gen = generator(&config);
        assert_eq!(gen.timestamp(1), 1_600_000_001_000_000_000);
    }

    #[test]
    fn test_zero_span_uses_now() {
        let config = RunConfig::default();
        let gen = generator(&config);
        let before = Utc::now().timestamp_nanos_opt().unwrap();
        let ts = gen.timestamp(99);
        assert!(ts >= before);
    }

    #[test]
    fn test_dry_run_value_is_constant() {
        let config = RunConfig {
            field_size: 8,
            dry_run: true,
            ..Default::default()
        };
        let gen = generator(&config);
        assert_eq!(gen.field_value(0, 0, 0), DRY_RUN_VALUE);
        assert_eq!(gen.field_value(999, 42, 0), DRY_RUN_VALUE);
    }

    #[test]
    fn test_encode_line() {
        let config = RunConfig {
            tag_cardinalities: vec![2, 2],
            fields_per_point: 2,
            field_size: 1,
            dry_run: true,
            points_per_series: 1,
            time_span: Duration::from_secs(1),
            ..Default::default()
        };
        let gen = generator(&config);
        let mut buf = String::new();
        gen.point(3, 0).encode(gen.space(), &mut buf);
        assert_eq!(buf, "m0,tag0=1,tag1=1 v0=0,v1=0 1700000000000000000");
    }
}
