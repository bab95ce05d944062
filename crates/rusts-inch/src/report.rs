//! End-of-run report and its publication.

use crate::abort::StopReason;
use crate::client::MetricsPublisher;
use crate::config::{ReportConfig, RunConfig};
use crate::stats::{LatencyStats, StatsSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;
use tracing::{info, warn};

/// Measurement name of the published report point.
pub const REPORT_MEASUREMENT: &str = "ingest";

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    MaxErrorsExceeded,
    Interrupted,
}

impl From<Option<StopReason>> for Outcome {
    fn from(reason: Option<StopReason>) -> Self {
        match reason {
            None => Outcome::Completed,
            Some(StopReason::MaxErrorsExceeded) => Outcome::MaxErrorsExceeded,
            Some(StopReason::Interrupted) => Outcome::Interrupted,
        }
    }
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::MaxErrorsExceeded => "max_errors_exceeded",
            Outcome::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Completed => write!(f, "completed"),
            Outcome::MaxErrorsExceeded => write!(f, "max errors exceeded"),
            Outcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Aggregate results of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub outcome: Outcome,
    pub elapsed: Duration,

    // Configuration
    pub total_series: u64,
    pub expected_points: u64,
    pub concurrency: usize,
    pub batch_size: usize,
    pub fields_per_point: usize,

    // Write statistics
    pub points_written: u64,
    pub batches_written: u64,
    pub bytes_written: u64,
    pub errors: u64,
    /// Mean over workers of each worker's last pacing delay
    pub final_delay: Duration,
    pub latency: LatencyStats,
}

impl Report {
    pub fn new(
        config: &RunConfig,
        total_series: u64,
        outcome: Outcome,
        elapsed: Duration,
        stats: StatsSnapshot,
    ) -> Self {
        Self {
            outcome,
            elapsed,
            total_series,
            expected_points: total_series.saturating_mul(config.points_per_series),
            concurrency: config.concurrency,
            batch_size: config.batch_size,
            fields_per_point: config.fields_per_point,
            points_written: stats.points_written,
            batches_written: stats.batches_written,
            bytes_written: stats.bytes_written,
            errors: stats.errors,
            final_delay: stats.mean_delay,
            latency: stats.latency,
        }
    }

    pub fn points_per_second(&self) -> f64 {
        rate(self.points_written, self.elapsed)
    }

    pub fn values_per_second(&self) -> f64 {
        self.points_per_second() * self.fields_per_point as f64
    }

    pub fn bytes_per_second(&self) -> f64 {
        rate(self.bytes_written, self.elapsed)
    }

    /// The point published to the report host.
    pub fn to_point(&self, tags: &BTreeMap<String, String>) -> ReportPoint {
        let mut fields = BTreeMap::new();
        fields.insert("points_n".to_string(), self.points_written as f64);
        fields.insert("batches_n".to_string(), self.batches_written as f64);
        fields.insert("bytes_n".to_string(), self.bytes_written as f64);
        fields.insert("errors_n".to_string(), self.errors as f64);
        fields.insert("points_ps".to_string(), self.points_per_second());
        fields.insert("values_ps".to_string(), self.values_per_second());
        fields.insert("elapsed_s".to_string(), self.elapsed.as_secs_f64());
        fields.insert("delay_ms".to_string(), self.final_delay.as_secs_f64() * 1000.0);
        fields.insert("latency_mean_us".to_string(), self.latency.mean_us as f64);
        fields.insert("latency_p90_us".to_string(), self.latency.p90_us as f64);
        fields.insert("latency_p95_us".to_string(), self.latency.p95_us as f64);
        fields.insert("latency_p99_us".to_string(), self.latency.p99_us as f64);

        let mut tags = tags.clone();
        tags.insert("outcome".to_string(), self.outcome.as_str().to_string());

        ReportPoint {
            measurement: REPORT_MEASUREMENT.to_string(),
            tags,
            fields,
            timestamp: chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0),
        }
    }

    /// Generates a JSON report.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Logs the summary.
    pub fn log_summary(&self) {
        info!(
            "Run {} after {:.1}s: {} points in {} batches ({:.1} pt/sec | {:.1} val/sec), {} errors",
            self.outcome,
            self.elapsed.as_secs_f64(),
            format_number(self.points_written),
            format_number(self.batches_written),
            self.points_per_second(),
            self.values_per_second(),
            self.errors,
        );
        info!(
            "Latency: {} | bytes: {} ({}/s) | mean delay: {:?}",
            self.latency.format_ms(),
            format_bytes(self.bytes_written),
            format_bytes(self.bytes_per_second() as u64),
            self.final_delay,
        );
    }
}

/// A tagged set of numeric fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    pub timestamp: i64,
}

impl ReportPoint {
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_key(&self.measurement);
        for (k, v) in &self.tags {
            if v.is_empty() {
                continue;
            }
            let _ = write!(line, ",{}={}", escape_key(k), escape_key(v));
        }
        for (i, (k, v)) in self.fields.iter().enumerate() {
            let sep = if i == 0 { ' ' } else { ',' };
            let v = if v.is_finite() { *v } else { 0.0 };
            let _ = write!(line, "{}{}={}", sep, escape_key(k), v);
        }
        let _ = write!(line, " {}", self.timestamp);
        line
    }
}

/// Publishes the report if a report host is configured. Failures are logged only.
pub async fn publish_report(
    publisher: &dyn MetricsPublisher,
    config: &ReportConfig,
    report: &Report,
) {
    let Some(host) = config.host.as_deref() else {
        return;
    };

    let point = report.to_point(&config.tags);
    match publisher
        .publish(host, &config.database, config.credentials.as_ref(), &point)
        .await
    {
        Ok(()) => info!("Published report to {}", host),
        Err(e) => warn!("Failed to publish report to {}: {}", host, e),
    }
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Escapes commas, spaces and equals signs in keys and tag values.
fn escape_key(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace(' ', "\\ ")
        .replace('=', "\\=")
}

/// Formats a number with thousand separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Formats bytes in human-readable form.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::error::PublishError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn sample_report() -> Report {
        let config = RunConfig {
            fields_per_point: 2,
            ..Default::default()
        };
        let stats = StatsSnapshot {
            points_written: 1000,
            batches_written: 10,
            bytes_written: 4096,
            errors: 1,
            ..Default::default()
        };
        Report::new(&config, 1000, Outcome::Completed, Duration::from_secs(2), stats)
    }

    #[derive(Default)]
    struct RecordingPublisher {
        fail: bool,
        published: Mutex<Vec<(String, ReportPoint)>>,
    }

    #[async_trait]
    impl MetricsPublisher for RecordingPublisher {
        async fn publish(
            &self,
            host: &str,
            _database: &str,
            _credentials: Option<&Credentials>,
            point: &ReportPoint,
        ) -> Result<(), PublishError> {
            self.published.lock().push((host.to_string(), point.clone()));
            if self.fail {
                Err(PublishError::Server {
                    status: 500,
                    body: "down".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_rates() {
        let report = sample_report();
        assert_eq!(report.expected_points, 100_000);
        assert!((report.points_per_second() - 500.0).abs() < f64::EPSILON);
        assert!((report.values_per_second() - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_elapsed_rate() {
        let mut report = sample_report();
        report.elapsed = Duration::ZERO;
        assert_eq!(report.points_per_second(), 0.0);
    }

    #[test]
    fn test_report_point_line_protocol() {
        let point = ReportPoint {
            measurement: "ingest".to_string(),
            tags: BTreeMap::from([
                ("stress_tool".to_string(), "inch".to_string()),
                ("t".to_string(), "10,10".to_string()),
                ("empty".to_string(), String::new()),
            ]),
            fields: BTreeMap::from([("a".to_string(), 1.5), ("b".to_string(), 2.0)]),
            timestamp: 7,
        };
        assert_eq!(
            point.to_line_protocol(),
            "ingest,stress_tool=inch,t=10\\,10 a=1.5,b=2 7"
        );
    }

    #[test]
    fn test_to_point_merges_tags() {
        let report = sample_report();
        let tags = BTreeMap::from([("c".to_string(), "4".to_string())]);
        let point = report.to_point(&tags);
        assert_eq!(point.measurement, REPORT_MEASUREMENT);
        assert_eq!(point.tags.get("c").map(String::as_str), Some("4"));
        assert_eq!(point.tags.get("outcome").map(String::as_str), Some("completed"));
        assert_eq!(point.fields.get("points_n"), Some(&1000.0));
        assert_eq!(point.fields.get("errors_n"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_publish_skipped_without_host() {
        let publisher = RecordingPublisher::default();
        publish_report(&publisher, &ReportConfig::default(), &sample_report()).await;
        assert!(publisher.published.lock().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_not_fatal() {
        let publisher = RecordingPublisher {
            fail: true,
            ..Default::default()
        };
        let config = ReportConfig {
            host: Some("http://reports:8086".to_string()),
            ..Default::default()
        };
        publish_report(&publisher, &config, &sample_report()).await;
        let published = publisher.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "http://reports:8086");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }
}
