//! Per-worker batch accumulation.

use crate::point::Point;
use crate::series::SeriesSpace;
use std::sync::Arc;

/// Line protocol body holding up to `batch_size` points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    body: String,
    points: usize,
}

impl Batch {
    /// Number of points in the batch.
    pub fn len(&self) -> usize {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points == 0
    }

    /// Newline separated line protocol.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn size_bytes(&self) -> usize {
        self.body.len()
    }

    /// Consumes the batch, handing over the body without copying it.
    pub fn into_body(self) -> String {
        self.body
    }
}

/// Accumulates points into batches. Owned by exactly one worker.
pub struct Batcher {
    space: Arc<SeriesSpace>,
    batch_size: usize,
    current: Batch,
}

impl Batcher {
    pub fn new(space: Arc<SeriesSpace>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            space,
            batch_size,
            current: Self::empty_batch(batch_size),
        }
    }

    /// Adds a point, returning the completed batch once it holds `batch_size` points.
    pub fn push(&mut self, point: &Point) -> Option<Batch> {
        if !self.current.is_empty() {
            self.current.body.push('\n');
        }
        point.encode(&self.space, &mut self.current.body);
        self.current.points += 1;

        if self.current.points >= self.batch_size {
            Some(self.take())
        } else {
            None
        }
    }

    /// Returns the partial batch, if any points are pending.
    pub fn flush(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    /// Points buffered but not yet handed out.
    pub fn pending(&self) -> usize {
        self.current.points
    }

    fn take(&mut self) -> Batch {
        std::mem::replace(&mut self.current, Self::empty_batch(self.batch_size))
    }

    fn empty_batch(batch_size: usize) -> Batch {
        Batch {
            // ~64 bytes per line is typical for small tag sets
            body: String::with_capacity(batch_size.min(100_000) * 64),
            points: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::point::PointGenerator;
    use chrono::Utc;

    fn setup(batch_size: usize) -> (PointGenerator, Batcher) {
        let config = RunConfig {
            tag_cardinalities: vec![5],
            batch_size,
            dry_run: true,
            ..Default::default()
        };
        let space = Arc::new(SeriesSpace::new(&config));
        let gen = PointGenerator::new(&config, space.clone(), Utc::now());
        (gen, Batcher::new(space, batch_size))
    }

    #[test]
    fn test_full_batches_are_emitted() {
        let (gen, mut batcher) = setup(3);

        assert!(batcher.push(&gen.point(0, 0)).is_none());
        assert!(batcher.push(&gen.point(1, 0)).is_none());
        let batch = batcher.push(&gen.point(2, 0)).expect("batch");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.body().lines().count(), 3);
        assert_eq!(batcher.pending(), 0);
    }

    #[test]
    fn test_final_partial_batch_is_flushed() {
        let (gen, mut batcher) = setup(4);
        let total_points = 10u64;

        let mut sizes = Vec::new();
        for i in 0..total_points {
            if let Some(batch) = batcher.push(&gen.point(i % 5, i / 5)) {
                sizes.push(batch.len());
            }
        }
        if let Some(batch) = batcher.flush() {
            sizes.push(batch.len());
        }

        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(batcher.flush().is_none());
    }

    #[test]
    fn test_into_body_keeps_lines() {
        let (gen, mut batcher) = setup(2);
        batcher.push(&gen.point(0, 0));
        let batch = batcher.push(&gen.point(1, 0)).unwrap();
        let expected = batch.body().to_string();
        let size = batch.size_bytes();

        let body = batch.into_body();
        assert_eq!(body, expected);
        assert_eq!(body.len(), size);
    }

    #[test]
    fn test_flush_empty_batcher() {
        let (_, mut batcher) = setup(10);
        assert!(batcher.flush().is_none());
    }

    #[test]
    fn test_batch_body_has_no_trailing_newline() {
        let (gen, mut batcher) = setup(2);
        batcher.push(&gen.point(0, 0));
        let batch = batcher.push(&gen.point(1, 0)).unwrap();
        assert!(!batch.body().ends_with('\n'));
        assert!(batch.body().starts_with("m0,tag0=0 "));
    }
}
