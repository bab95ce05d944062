//! Shared run statistics.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Latency histogram bounds in microseconds: 1us .. 60s, 3 significant figures.
const HISTOGRAM_LOW: u64 = 1;
const HISTOGRAM_HIGH: u64 = 60_000_000;
const HISTOGRAM_SIGFIG: u8 = 3;

/// Delay slot of a worker that has not finished a batch yet.
const NO_DELAY: u64 = u64::MAX;

/// Aggregate counters updated by every worker.
#[derive(Debug)]
pub struct RunStats {
    points_written: AtomicU64,
    batches_written: AtomicU64,
    bytes_written: AtomicU64,
    errors: AtomicU64,
    /// Last pacing delay per worker, in microseconds
    delays_us: Vec<AtomicU64>,
    latency: Mutex<Histogram<u64>>,
}

impl RunStats {
    pub fn new(workers: usize) -> Self {
        Self {
            points_written: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            delays_us: (0..workers.max(1)).map(|_| AtomicU64::new(NO_DELAY)).collect(),
            latency: Mutex::new(empty_histogram()),
        }
    }

    pub fn record_success(&self, points: u64, bytes: u64, latency: Duration) {
        self.points_written.fetch_add(points, Ordering::Relaxed);
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_error(&self, latency: Duration) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_delay(&self, worker: usize, delay: Duration) {
        if let Some(slot) = self.delays_us.get(worker) {
            let micros = u64::try_from(delay.as_micros()).unwrap_or(NO_DELAY - 1);
            slot.store(micros.min(NO_DELAY - 1), Ordering::Relaxed);
        }
    }

    /// Mean of the last delay of every worker that has reported one.
    fn mean_delay(&self) -> Duration {
        let (sum, count) = self
            .delays_us
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .filter(|&us| us != NO_DELAY)
            .fold((0u128, 0u128), |(sum, count), us| (sum + u128::from(us), count + 1));
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros((sum / count) as u64)
    }

    fn record_latency(&self, latency: Duration) {
        let micros = (latency.as_micros() as u64).clamp(HISTOGRAM_LOW, HISTOGRAM_HIGH);
        let _ = self.latency.lock().record(micros);
    }

    /// Consistent-enough view for progress output and the final report.
    pub fn snapshot(&self) -> StatsSnapshot {
        let latency = LatencyStats::from_histogram(&self.latency.lock());
        StatsSnapshot {
            points_written: self.points_written.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            mean_delay: self.mean_delay(),
            latency,
        }
    }
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub points_written: u64,
    pub batches_written: u64,
    pub bytes_written: u64,
    pub errors: u64,
    pub mean_delay: Duration,
    pub latency: LatencyStats,
}

/// Latency statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl LatencyStats {
    /// Computes latency statistics from a histogram.
    pub fn from_histogram(histogram: &Histogram<u64>) -> Self {
        if histogram.is_empty() {
            return Self::default();
        }

        Self {
            count: histogram.len(),
            min_us: histogram.min(),
            max_us: histogram.max(),
            mean_us: histogram.mean() as u64,
            p50_us: histogram.value_at_quantile(0.50),
            p90_us: histogram.value_at_quantile(0.90),
            p95_us: histogram.value_at_quantile(0.95),
            p99_us: histogram.value_at_quantile(0.99),
        }
    }

    /// Formats latency as a human-readable string.
    pub fn format_ms(&self) -> String {
        if self.count == 0 {
            "N/A".to_string()
        } else {
            format!(
                "mean={:.1}ms p90={:.1}ms p95={:.1}ms p99={:.1}ms",
                self.mean_us as f64 / 1000.0,
                self.p90_us as f64 / 1000.0,
                self.p95_us as f64 / 1000.0,
                self.p99_us as f64 / 1000.0
            )
        }
    }
}

fn empty_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HISTOGRAM_LOW, HISTOGRAM_HIGH, HISTOGRAM_SIGFIG)
        .expect("static histogram bounds are valid")
}
