//! Synthetic write-load generator for RusTs and other InfluxDB-compatible databases.
//!
//! Fabricates points with controllable tag cardinality, field width and measurement count,
//! then drives concurrent write traffic against one or more endpoints to measure ingest
//! throughput and latency.
//!
//! # Model
//! - Series: every combination of measurement and tag values, enumerated by a linear index
//! - Workers: each owns a contiguous range of series and writes `points_per_series`
//!   points for every one of them, in batches of `batch_size`
//! - Pacing: a fixed delay between batches, or an adaptive delay steering the write round
//!   trip towards a target latency
//! - Abort: the run stops early once `max_errors` batches failed, or on Ctrl-C
//!
//! # Usage
//! ```bash
//! # 1000 series, 100 points each, 4 writers
//! rusts-inch -c 4 -t 10,10,10 -p 100 --hosts http://localhost:8086
//!
//! # Measure generator throughput only
//! rusts-inch --dry -t 100,100 -p 10
//!
//! # Adapt the write delay to hold 50ms latency
//! rusts-inch --target-latency 50ms
//! ```

pub mod abort;
pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod pacer;
pub mod point;
pub mod report;
pub mod series;
pub mod simulator;
pub mod stats;

pub use client::{DatabaseProvisioner, HttpClient, MetricsPublisher, WriteClient};
pub use config::{Consistency, Credentials, ReportConfig, RunConfig};
pub use error::{ConfigError, Result, SimulatorError};
pub use report::{Outcome, Report};
pub use simulator::Simulator;
