//! Run configuration for the write-load generator.

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Widest field value we render; keeps values inside a `u64`.
pub const MAX_FIELD_SIZE: usize = 18;

/// Widest tag value padding accepted.
pub const MAX_TAG_SIZE: usize = 64;

/// Complete configuration for a single run. Built once, never mutated after workers start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Endpoints (e.g. "http://localhost:8086"), used round-robin
    pub hosts: Vec<String>,

    /// Database to write to
    pub database: String,

    /// Shard duration passed to database creation (e.g. "7d")
    pub shard_duration: String,

    /// Write consistency
    pub consistency: Consistency,

    /// Credentials for the write endpoints
    pub credentials: Option<Credentials>,

    /// Number of concurrent writers
    pub concurrency: usize,

    /// Number of measurements
    pub measurements: usize,

    /// Cardinality of each tag dimension
    pub tag_cardinalities: Vec<usize>,

    /// Minimum width of a tag value; natural decimal width when unset
    pub tag_size: Option<usize>,

    /// Points written for every series
    pub points_per_series: u64,

    /// Fields per point
    pub fields_per_point: usize,

    /// Digits in each field value
    pub field_size: usize,

    /// Points per batch
    pub batch_size: usize,

    /// Timestamp of the first point; run start when unset
    pub start_time: Option<DateTime<Utc>>,

    /// Span the points of a series are spread over; zero means "now" for every point
    pub time_span: Duration,

    /// Fixed delay between batches
    pub delay: Duration,

    /// Write latency the pacer steers towards
    pub target_latency: Option<Duration>,

    /// Abort after this many failed batches; 0 disables the limit
    pub max_errors: u64,

    /// Generate and batch without contacting any endpoint
    pub dry_run: bool,

    /// Create the database before writing
    pub create_database: bool,

    /// Upper bound on waiting for database creation
    pub database_creation_timeout: Duration,

    /// Request timeout for a single write
    pub write_timeout: Duration,

    /// How often the progress monitor logs a status line
    pub progress_interval: Duration,

    /// Where to publish the end-of-run report
    pub report: ReportConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["http://localhost:8086".to_string()],
            database: "stress".to_string(),
            shard_duration: "7d".to_string(),
            consistency: Consistency::Any,
            credentials: None,
            concurrency: 1,
            measurements: 1,
            tag_cardinalities: vec![10, 10, 10],
            tag_size: None,
            points_per_series: 100,
            fields_per_point: 1,
            field_size: 1,
            batch_size: 5000,
            start_time: None,
            time_span: Duration::ZERO,
            delay: Duration::ZERO,
            target_latency: None,
            max_errors: 0,
            dry_run: false,
            create_database: true,
            database_creation_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(30),
            progress_interval: Duration::from_secs(1),
            report: ReportConfig::default(),
        }
    }
}

impl RunConfig {
    /// Checks the invariants every other component relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        if let Some(pos) = self.hosts.iter().position(|h| h.trim().is_empty()) {
            return Err(ConfigError::EmptyHost(pos));
        }
        if self.measurements == 0 {
            return Err(ConfigError::NoMeasurements);
        }
        if let Some(index) = self.tag_cardinalities.iter().position(|&c| c == 0) {
            return Err(ConfigError::ZeroCardinality { index });
        }
        if self.points_per_series == 0 {
            return Err(ConfigError::NoPoints);
        }
        if self.fields_per_point == 0 {
            return Err(ConfigError::NoFields);
        }
        if self.field_size == 0 || self.field_size > MAX_FIELD_SIZE {
            return Err(ConfigError::InvalidFieldSize {
                actual: self.field_size,
                max: MAX_FIELD_SIZE,
            });
        }
        if let Some(tag_size) = self.tag_size.filter(|&size| size > MAX_TAG_SIZE) {
            return Err(ConfigError::InvalidTagSize {
                actual: tag_size,
                max: MAX_TAG_SIZE,
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.database.is_empty() {
            return Err(ConfigError::EmptyDatabase);
        }
        if self.shard_duration.is_empty() {
            return Err(ConfigError::EmptyShardDuration);
        }

        // Series count times points per series must fit as well.
        let series = self.tag_cardinalities.iter().try_fold(
            self.measurements as u64,
            |acc, &c| acc.checked_mul(c as u64),
        );
        match series.and_then(|s| s.checked_mul(self.points_per_series)) {
            Some(_) => Ok(()),
            None => Err(ConfigError::SeriesSpaceOverflow),
        }
    }

    /// Returns the pacing mode implied by the delay settings.
    pub fn pacing(&self) -> Pacing {
        match self.target_latency {
            Some(target) if !target.is_zero() => Pacing::Adaptive {
                target,
                initial: self.delay,
            },
            _ => Pacing::Fixed(self.delay),
        }
    }
}

/// How the pacer picks the delay between batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Same delay every time (zero means unthrottled)
    Fixed(Duration),
    /// Delay adapts so the write round trip approaches `target`
    Adaptive { target: Duration, initial: Duration },
}

/// Username/password pair sent as HTTP basic auth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Builds credentials, treating an empty username as "no auth".
    pub fn from_parts(username: impl Into<String>, password: impl Into<String>) -> Option<Self> {
        let username = username.into();
        if username.is_empty() {
            return None;
        }
        Some(Self {
            username,
            password: password.into(),
        })
    }
}

/// Write consistency level understood by InfluxDB-compatible endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    #[default]
    Any,
    One,
    Quorum,
    All,
}

impl Consistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::Any => "any",
            Consistency::One => "one",
            Consistency::Quorum => "quorum",
            Consistency::All => "all",
        }
    }
}

impl std::fmt::Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Consistency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(Consistency::Any),
            "one" => Ok(Consistency::One),
            "quorum" => Ok(Consistency::Quorum),
            "all" => Ok(Consistency::All),
            _ => Err(ConfigError::InvalidConsistency(s.to_string())),
        }
    }
}

/// Destination for the end-of-run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Host receiving the report; reporting is disabled when unset
    pub host: Option<String>,

    /// Database the report point is written to
    pub database: String,

    /// Credentials for the report host
    pub credentials: Option<Credentials>,

    /// Tags attached to the report point
    pub tags: BTreeMap<String, String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            host: None,
            database: "ingest_benchmarks".to_string(),
            credentials: None,
            tags: BTreeMap::new(),
        }
    }
}
