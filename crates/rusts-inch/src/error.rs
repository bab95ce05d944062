//! Error types for rusts-inch

use std::time::Duration;
use thiserror::Error;

/// Problems with a `RunConfig` detected before any worker starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least one host is required")]
    NoHosts,

    #[error("Empty host at position {0}")]
    EmptyHost(usize),

    #[error("Measurement count must be at least 1")]
    NoMeasurements,

    #[error("Tag cardinality at position {index} must be at least 1")]
    ZeroCardinality { index: usize },

    #[error("Points per series must be at least 1")]
    NoPoints,

    #[error("Fields per point must be at least 1")]
    NoFields,

    #[error("Field size must be between 1 and {max} digits, got {actual}")]
    InvalidFieldSize { actual: usize, max: usize },

    #[error("Tag size must be at most {max}, got {actual}")]
    InvalidTagSize { actual: usize, max: usize },

    #[error("Batch size must be at least 1")]
    ZeroBatchSize,

    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Database name must not be empty")]
    EmptyDatabase,

    #[error("Shard duration must not be empty")]
    EmptyShardDuration,

    #[error("Series space overflows 64 bits")]
    SeriesSpaceOverflow,

    #[error("Invalid consistency level: {0}")]
    InvalidConsistency(String),
}

/// Failure of a single batch write.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned error: {status} - {body}")]
    Server { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

/// Failure to create the target database.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned error: {status} - {body}")]
    Server { status: u16, body: String },

    #[error("Database was not created within {0:?}")]
    Timeout(Duration),
}

/// Failure to publish the run report.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned error: {status} - {body}")]
    Server { status: u16, body: String },
}

/// Errors that stop a run before or while it starts.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to create database: {0}")]
    Provisioning(#[from] ProvisionError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type alias for simulator operations
pub type Result<T> = std::result::Result<T, SimulatorError>;
