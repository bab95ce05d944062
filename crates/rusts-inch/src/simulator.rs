//! Worker pool and main loop.

use crate::abort::AbortController;
use crate::batch::{Batch, Batcher};
use crate::client::{
    DatabaseProvisioner, DatabaseRequest, DryRunClient, HttpClient, MetricsPublisher,
    WriteClient, WriteRequest,
};
use crate::config::RunConfig;
use crate::error::{ProvisionError, Result};
use crate::pacer::Pacer;
use crate::point::PointGenerator;
use crate::report::{publish_report, Outcome, Report};
use crate::series::SeriesSpace;
use crate::stats::RunStats;
use chrono::Utc;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Splits `[0, total)` into `workers` contiguous ranges that cover it exactly once.
///
/// When there are more workers than series the surplus ranges are empty.
pub fn partition(total: u64, workers: usize) -> Vec<Range<u64>> {
    let workers = workers.max(1) as u128;
    let total = total as u128;
    (0..workers)
        .map(|w| {
            let start = (total * w / workers) as u64;
            let end = (total * (w + 1) / workers) as u64;
            start..end
        })
        .collect()
}

/// Endpoint for a worker's `sequence`-th batch. Workers start on different hosts.
pub fn endpoint_index(worker: usize, sequence: u64, endpoints: usize) -> usize {
    let endpoints = endpoints.max(1) as u64;
    ((worker as u64 % endpoints + sequence % endpoints) % endpoints) as usize
}

/// Drives a run: provisioning, workers, progress and reporting.
pub struct Simulator {
    config: Arc<RunConfig>,
    writer: Arc<dyn WriteClient>,
    provisioner: Arc<dyn DatabaseProvisioner>,
    publisher: Arc<dyn MetricsPublisher>,
    cancel: CancellationToken,
}

impl Simulator {
    /// Simulator talking HTTP to the configured hosts.
    pub fn new(config: RunConfig) -> Result<Self> {
        let http = Arc::new(HttpClient::new(config.write_timeout)?);
        Ok(Self::with_clients(config, http.clone(), http.clone(), http))
    }

    /// Simulator with caller supplied capabilities.
    pub fn with_clients(
        config: RunConfig,
        writer: Arc<dyn WriteClient>,
        provisioner: Arc<dyn DatabaseProvisioner>,
        publisher: Arc<dyn MetricsPublisher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            writer,
            provisioner,
            publisher,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops all workers after their in-flight batch.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs to completion, abort or interruption and returns the aggregate results.
    pub async fn run(&self) -> Result<Report> {
        let config = &self.config;
        config.validate()?;

        let space = Arc::new(SeriesSpace::new(config));
        let total_series = space.total_series();
        info!(
            "Starting run: {} series ({} measurements, tags {:?}), {} points per series, {} workers, batch size {}",
            total_series,
            config.measurements,
            config.tag_cardinalities,
            config.points_per_series,
            config.concurrency,
            config.batch_size
        );

        if config.dry_run {
            info!("Dry run: no data will be sent");
        } else if config.create_database {
            self.provision().await?;
        }

        let writer: Arc<dyn WriteClient> = if config.dry_run {
            Arc::new(DryRunClient)
        } else {
            Arc::clone(&self.writer)
        };

        let stats = Arc::new(RunStats::new(config.concurrency));
        let controller = Arc::new(AbortController::new(config.max_errors, self.cancel.clone()));
        let generator = Arc::new(PointGenerator::new(config, Arc::clone(&space), Utc::now()));

        let start = Instant::now();
        let monitor_done = CancellationToken::new();
        let monitor = (!config.progress_interval.is_zero()).then(|| {
            tokio::spawn(run_monitor(
                Arc::clone(&stats),
                config.progress_interval,
                config.fields_per_point,
                start,
                monitor_done.clone(),
            ))
        });

        let mut handles = Vec::with_capacity(config.concurrency);
        for (id, range) in partition(total_series, config.concurrency).into_iter().enumerate() {
            let worker = Worker {
                id,
                range,
                config: Arc::clone(config),
                generator: Arc::clone(&generator),
                writer: Arc::clone(&writer),
                stats: Arc::clone(&stats),
                controller: Arc::clone(&controller),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker failed: {}", e);
            }
        }

        monitor_done.cancel();
        if let Some(monitor) = monitor {
            let _ = monitor.await;
        }

        let outcome = Outcome::from(controller.reason());
        let report = Report::new(config, total_series, outcome, start.elapsed(), stats.snapshot());
        report.log_summary();
        publish_report(self.publisher.as_ref(), &config.report, &report).await;

        Ok(report)
    }

    async fn provision(&self) -> Result<()> {
        let config = &self.config;
        let request = DatabaseRequest {
            endpoint: &config.hosts[0],
            name: &config.database,
            shard_duration: &config.shard_duration,
            credentials: config.credentials.as_ref(),
        };
        let timeout = config.database_creation_timeout;

        match tokio::time::timeout(timeout, self.provisioner.ensure_database(request)).await {
            Ok(Ok(())) => {
                info!(
                    "Database {} ready (shard duration {})",
                    config.database, config.shard_duration
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProvisionError::Timeout(timeout).into()),
        }
    }
}

/// One writer: owns a series range, a batcher and a pacer.
struct Worker {
    id: usize,
    range: Range<u64>,
    config: Arc<RunConfig>,
    generator: Arc<PointGenerator>,
    writer: Arc<dyn WriteClient>,
    stats: Arc<RunStats>,
    controller: Arc<AbortController>,
}

impl Worker {
    async fn run(self) {
        if self.range.is_empty() {
            debug!("Worker {} has no series assigned", self.id);
            return;
        }
        debug!("Worker {} writing series {:?}", self.id, self.range);

        let mut batcher = Batcher::new(Arc::clone(self.generator.space()), self.config.batch_size);
        let mut pacer = Pacer::new(self.config.pacing());
        let mut sequence = 0u64;

        // Point index outer, series inner: every batch spans many series at one timestamp
        // while each series still receives its points in order.
        'points: for point_index in 0..self.config.points_per_series {
            for series_index in self.range.clone() {
                let point = self.generator.point(series_index, point_index);
                if let Some(batch) = batcher.push(&point) {
                    if !self.send(batch, &mut pacer, &mut sequence).await {
                        break 'points;
                    }
                }
            }
        }

        if !self.controller.should_stop() {
            if let Some(batch) = batcher.flush() {
                self.send(batch, &mut pacer, &mut sequence).await;
            }
        }

        debug!("Worker {} finished after {} batches", self.id, sequence);
    }

    /// Sends one batch and paces. Returns false once the worker should stop.
    async fn send(&self, batch: Batch, pacer: &mut Pacer, sequence: &mut u64) -> bool {
        if self.controller.should_stop() {
            return false;
        }

        let hosts = &self.config.hosts;
        let endpoint = &hosts[endpoint_index(self.id, *sequence, hosts.len())];
        *sequence += 1;

        let points = batch.len() as u64;
        let bytes = batch.size_bytes() as u64;
        let result = self
            .writer
            .write(WriteRequest {
                endpoint,
                database: &self.config.database,
                consistency: self.config.consistency,
                credentials: self.config.credentials.as_ref(),
                batch,
            })
            .await;

        match result.outcome {
            Ok(()) => {
                self.stats.record_success(points, bytes, result.latency);
            }
            Err(e) => {
                self.stats.record_error(result.latency);
                warn!("Write to {} failed: {}", endpoint, e);
                if self.controller.record_error() {
                    error!(
                        "Max errors ({}) reached, stopping all workers",
                        self.config.max_errors
                    );
                }
            }
        }

        let delay = pacer.observe_write(result.latency);
        self.stats.record_delay(self.id, delay);
        if delay.is_zero() {
            // Unthrottled writers against an instant client would otherwise never yield.
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.controller.stopped() => return false,
            }
        }

        !self.controller.should_stop()
    }
}

/// Logs a status line every `interval` until `done` fires.
async fn run_monitor(
    stats: Arc<RunStats>,
    interval: Duration,
    fields_per_point: usize,
    start: Instant,
    done: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = ticker.tick() => {
                let snap = stats.snapshot();
                let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
                let points_ps = snap.points_written as f64 / elapsed;
                info!(
                    "T={:08} {} points written ({:.1} pt/sec | {:.1} val/sec) errors: {} | {} | mean delay: {:?}",
                    start.elapsed().as_secs(),
                    snap.points_written,
                    points_ps,
                    points_ps * fields_per_point as f64,
                    snap.errors,
                    snap.latency.format_ms(),
                    snap.mean_delay,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_partition_is_disjoint_cover() {
        for total in [0u64, 1, 2, 7, 100, 1001] {
            for workers in [1usize, 2, 3, 8, 16, 150] {
                let ranges = partition(total, workers);
                assert_eq!(ranges.len(), workers);

                let mut seen = HashSet::new();
                for range in &ranges {
                    for i in range.clone() {
                        assert!(seen.insert(i), "index {i} assigned twice");
                    }
                }
                assert_eq!(seen.len() as u64, total);
                assert!(seen.iter().all(|&i| i < total));
            }
        }
    }

    #[test]
    fn test_partition_more_workers_than_series() {
        let ranges = partition(3, 5);
        let sizes: Vec<u64> = ranges.iter().map(|r| r.end - r.start).collect();
        assert_eq!(sizes.iter().sum::<u64>(), 3);
        assert_eq!(sizes.iter().filter(|&&s| s == 0).count(), 2);
    }

    #[test]
    fn test_partition_is_contiguous() {
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![0..3, 3..6, 6..10]);
    }

    #[test]
    fn test_endpoint_round_robin() {
        let picks: Vec<usize> = (0..6).map(|s| endpoint_index(0, s, 3)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);

        let offset: Vec<usize> = (0..3).map(|s| endpoint_index(4, s, 3)).collect();
        assert_eq!(offset, vec![1, 2, 0]);

        assert_eq!(endpoint_index(7, 9, 1), 0);
        assert_eq!(endpoint_index(usize::MAX, u64::MAX, 4), 2);
    }
}
