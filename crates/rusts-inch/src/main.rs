//! CLI entry point for the write-load generator.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use rusts_inch::{Consistency, Credentials, Outcome, ReportConfig, RunConfig, Simulator};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rusts-inch")]
#[command(about = "Write-load generator for RusTs and InfluxDB-compatible databases")]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short = 'v')]
    verbose: bool,

    /// Host to send the run report to
    #[arg(long)]
    report_host: Option<String>,

    /// User for the report host
    #[arg(long, default_value = "")]
    report_user: String,

    /// Password for the report host
    #[arg(long, default_value = "")]
    report_password: String,

    /// Comma separated k:v tags to report alongside metrics
    #[arg(long, default_value = "")]
    report_tags: String,

    /// Dry run (maximum generator throughput on this box)
    #[arg(long)]
    dry: bool,

    /// Stop once this many writes failed (0 = never)
    #[arg(long, default_value = "0")]
    max_errors: u64,

    /// Comma separated list of hosts, used round-robin
    #[arg(long, default_value = "http://localhost:8086")]
    hosts: String,

    /// Host user
    #[arg(long, default_value = "")]
    user: String,

    /// Host password
    #[arg(long, default_value = "")]
    password: String,

    /// Write consistency (any, one, quorum, all)
    #[arg(long, default_value = "any")]
    consistency: Consistency,

    /// Concurrency
    #[arg(short = 'c', default_value = "1")]
    concurrency: usize,

    /// Measurements
    #[arg(short = 'm', default_value = "1")]
    measurements: usize,

    /// Tag cardinalities
    #[arg(short = 't', default_value = "10,10,10")]
    tags: String,

    /// Minimum size of a tag value (default: number of digits of the value)
    #[arg(long)]
    tag_size: Option<usize>,

    /// Points per series
    #[arg(short = 'p', default_value = "100")]
    points_per_series: u64,

    /// Fields per point
    #[arg(short = 'f', default_value = "1")]
    fields_per_point: usize,

    /// Size (in digits) of each field value
    #[arg(long, default_value = "1")]
    field_size: usize,

    /// Batch size
    #[arg(short = 'b', default_value = "5000")]
    batch_size: usize,

    /// Database to write to
    #[arg(long, default_value = "stress")]
    db: String,

    /// Shard duration of the created database
    #[arg(long, default_value = "7d")]
    shard_duration: String,

    /// Skip database creation
    #[arg(long)]
    no_create_db: bool,

    /// Start time of the generated points (RFC 3339, default now)
    #[arg(long, value_parser = parse_start_time)]
    start_time: Option<DateTime<Utc>>,

    /// Time span to spread the points of each series over
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    time: Duration,

    /// Delay between writes
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    delay: Duration,

    /// Max time, in seconds, to wait for the database to be created
    #[arg(long, default_value = "5")]
    db_creation_timeout: u64,

    /// Adapt the delay between writes to meet this latency
    #[arg(long, value_parser = humantime::parse_duration)]
    target_latency: Option<Duration>,

    /// Write the final report as JSON to this file
    #[arg(short = 'o', long)]
    output: Option<String>,
}

fn parse_start_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

fn parse_cardinalities(s: &str) -> Result<Vec<usize>> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .with_context(|| format!("cannot parse tag cardinality: {}", part))
        })
        .collect()
}

fn parse_hosts(s: &str) -> Result<Vec<String>> {
    let hosts: Vec<String> = s
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(String::from)
        .collect();
    if hosts.is_empty() {
        bail!("cannot parse hosts: {}", s);
    }
    Ok(hosts)
}

fn parse_report_tags(s: &str, tags: &mut BTreeMap<String, String>) -> Result<()> {
    for pair in s.split(',').filter(|p| !p.is_empty()) {
        match pair.split_once(':') {
            Some((k, v)) if !k.is_empty() && !v.contains(':') => {
                tags.insert(k.to_string(), v.to_string());
            }
            _ => bail!("invalid tag pair {:?}", pair),
        }
    }
    Ok(())
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        let mut tags = BTreeMap::from([
            ("stress_tool".to_string(), "inch".to_string()),
            ("t".to_string(), self.tags.clone()),
            (
                "tag_size".to_string(),
                self.tag_size.map_or_else(|| "-1".to_string(), |s| s.to_string()),
            ),
            ("batch_size".to_string(), self.batch_size.to_string()),
            ("p".to_string(), self.points_per_series.to_string()),
            ("c".to_string(), self.concurrency.to_string()),
            ("m".to_string(), self.measurements.to_string()),
            ("f".to_string(), self.fields_per_point.to_string()),
            ("field_size".to_string(), self.field_size.to_string()),
            ("sd".to_string(), self.shard_duration.clone()),
        ]);
        parse_report_tags(&self.report_tags, &mut tags)?;

        Ok(RunConfig {
            hosts: parse_hosts(&self.hosts)?,
            database: self.db,
            shard_duration: self.shard_duration,
            consistency: self.consistency,
            credentials: Credentials::from_parts(self.user, self.password),
            concurrency: self.concurrency,
            measurements: self.measurements,
            tag_cardinalities: parse_cardinalities(&self.tags)?,
            tag_size: self.tag_size,
            points_per_series: self.points_per_series,
            fields_per_point: self.fields_per_point,
            field_size: self.field_size,
            batch_size: self.batch_size,
            start_time: self.start_time,
            time_span: self.time,
            delay: self.delay,
            target_latency: self.target_latency,
            max_errors: self.max_errors,
            dry_run: self.dry,
            create_database: !self.no_create_db,
            database_creation_timeout: Duration::from_secs(self.db_creation_timeout),
            report: ReportConfig {
                host: self.report_host,
                credentials: Credentials::from_parts(self.report_user, self.report_password),
                tags,
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let output = cli.output.clone();
    let config = cli.into_config()?;
    let simulator = Simulator::new(config)?;

    let cancel = simulator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for in-flight writes");
            cancel.cancel();
        }
    });

    let report = simulator.run().await?;

    if let Some(path) = output {
        std::fs::write(&path, report.to_json())?;
        info!("JSON report saved to: {}", path);
    }

    match report.outcome {
        Outcome::Completed => Ok(()),
        Outcome::Interrupted => {
            warn!("Run interrupted before all points were written");
            Ok(())
        }
        Outcome::MaxErrorsExceeded => bail!("max errors exceeded ({} errors)", report.errors),
    }
}
