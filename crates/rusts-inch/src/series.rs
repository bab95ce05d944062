//! Series space enumeration.
//!
//! A run writes to `M * c1 * ... * ck` series. Every series has a linear index in
//! `[0, total)`; the index is read as a mixed-radix number with radices
//! `[M, c1, ..., ck]`, the measurement being the most significant digit. The mapping is a
//! bijection, so the same index always names the same series and no two indices collide.

use crate::config::RunConfig;
use std::fmt::Write;

/// Coordinates of one series: measurement index plus one value index per tag dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub measurement: u64,
    pub tags: Vec<u64>,
}

/// The addressable set of series for a run.
#[derive(Debug, Clone)]
pub struct SeriesSpace {
    measurements: u64,
    cardinalities: Vec<u64>,
    tag_size: usize,
    total: u64,
}

impl SeriesSpace {
    /// Builds the space from a validated config.
    ///
    /// Callers are expected to have run `RunConfig::validate`, which rejects zero
    /// cardinalities and spaces that do not fit in a `u64`.
    pub fn new(config: &RunConfig) -> Self {
        let cardinalities: Vec<u64> = config.tag_cardinalities.iter().map(|&c| c as u64).collect();
        let measurements = config.measurements as u64;
        let total = cardinalities
            .iter()
            .fold(measurements, |acc, &c| acc.saturating_mul(c));

        Self {
            measurements,
            cardinalities,
            tag_size: config.tag_size.unwrap_or(0),
            total,
        }
    }

    /// Total number of series.
    pub fn total_series(&self) -> u64 {
        self.total
    }

    /// Maps a linear index in `[0, total_series)` to its series key.
    pub fn key(&self, index: u64) -> SeriesKey {
        debug_assert!(index < self.total, "series index {index} out of range");

        let mut tags = vec![0; self.cardinalities.len()];
        let mut rest = index;
        for (slot, &radix) in tags.iter_mut().zip(&self.cardinalities).rev() {
            *slot = rest % radix;
            rest /= radix;
        }

        SeriesKey {
            measurement: rest % self.measurements,
            tags,
        }
    }

    /// Inverse of [`SeriesSpace::key`].
    pub fn index(&self, key: &SeriesKey) -> u64 {
        key.tags
            .iter()
            .zip(&self.cardinalities)
            .fold(key.measurement, |acc, (&value, &radix)| acc * radix + value)
    }

    /// Appends the line protocol series key (`m0,tag0=00,tag1=07`) to `buf`.
    pub fn write_key(&self, key: &SeriesKey, buf: &mut String) {
        let _ = write!(buf, "m{}", key.measurement);
        for (i, value) in key.tags.iter().enumerate() {
            let _ = write!(buf, ",tag{}={:0width$}", i, value, width = self.tag_size);
        }
    }

    /// Renders the series key as an owned string.
    pub fn render_key(&self, key: &SeriesKey) -> String {
        let mut buf = String::with_capacity(8 + self.cardinalities.len() * 12);
        self.write_key(key, &mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn space(measurements: usize, tags: Vec<usize>, tag_size: Option<usize>) -> SeriesSpace {
        SeriesSpace::new(&RunConfig {
            measurements,
            tag_cardinalities: tags,
            tag_size,
            ..Default::default()
        })
    }

    #[test]
    fn test_total_series() {
        assert_eq!(space(1, vec![2, 2], None).total_series(), 4);
        assert_eq!(space(3, vec![10, 10, 10], None).total_series(), 3000);
        assert_eq!(space(5, vec![], None).total_series(), 5);
    }

    #[test]
    fn test_measurement_is_most_significant_digit() {
        let s = space(2, vec![3, 2], None);
        assert_eq!(
            s.key(0),
            SeriesKey {
                measurement: 0,
                tags: vec![0, 0]
            }
        );
        assert_eq!(
            s.key(1),
            SeriesKey {
                measurement: 0,
                tags: vec![0, 1]
            }
        );
        assert_eq!(
            s.key(2),
            SeriesKey {
                measurement: 0,
                tags: vec![1, 0]
            }
        );
        assert_eq!(
            s.key(6),
            SeriesKey {
                measurement: 1,
                tags: vec![0, 0]
            }
        );
        assert_eq!(
            s.key(11),
            SeriesKey {
                measurement: 1,
                tags: vec![2, 1]
            }
        );
    }

    #[test]
    fn test_mapping_is_bijective() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..20 {
            let measurements = rng.gen_range(1..4);
            let dims = rng.gen_range(0..4);
            let tags: Vec<usize> = (0..dims).map(|_| rng.gen_range(1..6)).collect();
            let s = space(measurements, tags.clone(), None);

            let mut seen = HashSet::new();
            for i in 0..s.total_series() {
                let key = s.key(i);
                assert!(key.measurement < measurements as u64);
                for (value, &card) in key.tags.iter().zip(&tags) {
                    assert!(*value < card as u64);
                }
                assert_eq!(s.index(&key), i);
                assert!(seen.insert(s.render_key(&key)), "duplicate key for {tags:?}");
            }
            assert_eq!(seen.len() as u64, s.total_series());
        }
    }

    #[test]
    fn test_key_is_stable() {
        let s = space(2, vec![7, 5], None);
        assert_eq!(s.key(42), s.key(42));
        assert_eq!(s.render_key(&s.key(42)), s.render_key(&s.key(42)));
    }

    #[test]
    fn test_render_key_padding() {
        let natural = space(1, vec![2, 20], None);
        assert_eq!(natural.render_key(&natural.key(13)), "m0,tag0=0,tag1=13");

        let padded = space(1, vec![2, 20], Some(4));
        assert_eq!(padded.render_key(&padded.key(13)), "m0,tag0=0000,tag1=0013");
    }
}
