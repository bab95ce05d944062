//! Capabilities the engine consumes from the database: writing batches, creating the target
//! database and publishing the run report. HTTP implementations speak the InfluxDB 1.x API.

use crate::batch::Batch;
use crate::config::{Consistency, Credentials};
use crate::error::{ProvisionError, PublishError, WriteError};
use crate::report::ReportPoint;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Pause between database creation attempts while the server is unreachable.
const PROVISION_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Everything needed to submit one batch. The batch is moved in so its body can be sent
/// without a copy.
#[derive(Debug)]
pub struct WriteRequest<'a> {
    pub endpoint: &'a str,
    pub database: &'a str,
    pub consistency: Consistency,
    pub credentials: Option<&'a Credentials>,
    pub batch: Batch,
}

/// Outcome of one batch submission.
#[derive(Debug)]
pub struct WriteResult {
    pub latency: Duration,
    pub outcome: Result<(), WriteError>,
}

/// Submits batches. Must be safe to call concurrently from independent workers.
#[async_trait]
pub trait WriteClient: Send + Sync {
    async fn write(&self, request: WriteRequest<'_>) -> WriteResult;
}

/// Database creation request.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseRequest<'a> {
    pub endpoint: &'a str,
    pub name: &'a str,
    pub shard_duration: &'a str,
    pub credentials: Option<&'a Credentials>,
}

/// Creates the target database. Callers bound the wait with their own timeout.
#[async_trait]
pub trait DatabaseProvisioner: Send + Sync {
    async fn ensure_database(&self, request: DatabaseRequest<'_>) -> Result<(), ProvisionError>;
}

/// Best-effort sink for the run report.
#[async_trait]
pub trait MetricsPublisher: Send + Sync {
    async fn publish(
        &self,
        host: &str,
        database: &str,
        credentials: Option<&Credentials>,
        point: &ReportPoint,
    ) -> Result<(), PublishError>;
}

/// HTTP client shared by all workers.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn post(
        &self,
        endpoint: &str,
        path: &str,
        credentials: Option<&Credentials>,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), path);
        let builder = self.client.post(url);
        match credentials {
            Some(c) => builder.basic_auth(&c.username, Some(&c.password)),
            None => builder,
        }
    }

    async fn create_database_once(
        &self,
        request: &DatabaseRequest<'_>,
    ) -> Result<(), ProvisionError> {
        let q = format!(
            "CREATE DATABASE \"{}\" WITH SHARD DURATION {}",
            request.name.replace('"', "\\\""),
            request.shard_duration
        );
        let response = self
            .post(request.endpoint, "query", request.credentials)
            .form(&[("q", q.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ProvisionError::Server {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl WriteClient for HttpClient {
    async fn write(&self, request: WriteRequest<'_>) -> WriteResult {
        let start = Instant::now();
        let sent = self
            .post(request.endpoint, "write", request.credentials)
            .query(&[
                ("db", request.database),
                ("consistency", request.consistency.as_str()),
                ("precision", "ns"),
            ])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(request.batch.into_body())
            .send()
            .await;

        let outcome = match sent {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err(WriteError::Server { status, body })
            }
            Err(e) => Err(WriteError::Http(e)),
        };

        WriteResult {
            latency: start.elapsed(),
            outcome,
        }
    }
}

#[async_trait]
impl DatabaseProvisioner for HttpClient {
    async fn ensure_database(&self, request: DatabaseRequest<'_>) -> Result<(), ProvisionError> {
        loop {
            match self.create_database_once(&request).await {
                Ok(()) => return Ok(()),
                // The server answered; retrying will not change its mind.
                Err(e @ ProvisionError::Server { .. }) => return Err(e),
                Err(e) => {
                    debug!("Database creation attempt failed: {}", e);
                    tokio::time::sleep(PROVISION_RETRY_INTERVAL).await;
                }
            }
        }
    }
}

#[async_trait]
impl MetricsPublisher for HttpClient {
    async fn publish(
        &self,
        host: &str,
        database: &str,
        credentials: Option<&Credentials>,
        point: &ReportPoint,
    ) -> Result<(), PublishError> {
        let response = self
            .post(host, "write", credentials)
            .query(&[("db", database), ("precision", "ns")])
            .body(point.to_line_protocol())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!("Report host rejected metrics: {} - {}", status, body);
        Err(PublishError::Server {
            status: status.as_u16(),
            body,
        })
    }
}

/// Accepts every batch without touching the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunClient;

#[async_trait]
impl WriteClient for DryRunClient {
    async fn write(&self, _request: WriteRequest<'_>) -> WriteResult {
        WriteResult {
            latency: Duration::ZERO,
            outcome: Ok(()),
        }
    }
}
