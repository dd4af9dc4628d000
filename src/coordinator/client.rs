//! Render workers.
//!
//! Each worker loop asks the server for a batch, renders it, and posts the compressed escape
//! maps back, until the server runs out of jobs, the abort file appears, or the server stops
//! answering.

use crate::cancel::{AbortFile, CancelToken};
use crate::config::{CoordinatorConfig, RenderConfig};
use crate::coordinator::protocol::{
    encode, CompletionReport, JobBatch, RenderedFrame, DONE_REPLY, HELLO_REPLY,
};
use crate::coordinator::retry::RetryPolicy;
use crate::error::{ApiError, WorkError};
use crate::oracle::MembershipOracle;
use crate::render::render_compressed;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// How a worker talks to the render server
#[async_trait]
pub trait CoordinatorTransport: Send + Sync {
    /// Liveness check
    async fn hello(&self) -> Result<(), WorkError>;

    /// Next batch of jobs; empty when the server has nothing left
    async fn fetch_batch(&self) -> Result<JobBatch, WorkError>;

    async fn report(&self, report: &CompletionReport) -> Result<(), WorkError>;
}

fn map_http_error(error: reqwest::Error) -> WorkError {
    if error.is_status() {
        WorkError::UnexpectedResponse(error.to_string())
    } else {
        WorkError::Transport(error.to_string())
    }
}

/// HTTP transport with retry on connection failures
pub struct HttpTransport {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(base_url: &str, retry: RetryPolicy) -> Result<Self, WorkError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WorkError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Ask the server to write its pending frames; returns the server's reply
    pub async fn flush(&self) -> Result<String, WorkError> {
        let body = self.get_bytes("flush").await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, WorkError> {
        let url = self.url(path);
        let (client, url) = (&self.client, &url);
        self.retry
            .run(path, || async move {
                let response = client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(map_http_error)?;
                let body = response.bytes().await.map_err(map_http_error)?;
                Ok(body.to_vec())
            })
            .await
    }

    async fn post_bytes(&self, path: &str, body: Vec<u8>) -> Result<String, WorkError> {
        let url = self.url(path);
        let (client, url, body) = (&self.client, &url, &body);
        self.retry
            .run(path, || async move {
                let response = client
                    .post(url)
                    .body(body.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(map_http_error)?;
                response.text().await.map_err(map_http_error)
            })
            .await
    }
}

#[async_trait]
impl CoordinatorTransport for HttpTransport {
    async fn hello(&self) -> Result<(), WorkError> {
        let body = self.get_bytes("hello").await?;
        if body == HELLO_REPLY.as_bytes() {
            Ok(())
        } else {
            Err(WorkError::UnexpectedResponse(
                String::from_utf8_lossy(&body).into_owned(),
            ))
        }
    }

    async fn fetch_batch(&self) -> Result<JobBatch, WorkError> {
        let body = self.get_bytes("get").await?;
        JobBatch::from_body(&body)
    }

    async fn report(&self, report: &CompletionReport) -> Result<(), WorkError> {
        let reply = self.post_bytes("done", encode(report)?).await?;
        if reply == DONE_REPLY {
            Ok(())
        } else {
            Err(WorkError::UnexpectedResponse(reply))
        }
    }
}

/// Totals for one worker loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerReport {
    pub batches: usize,
    pub frames: usize,
    /// Stopped by the abort file rather than by an empty batch
    pub cancelled: bool,
}

/// Pull, render and report batches until the job list is exhausted or `cancel` fires.
///
/// `cancel` is only checked between batches. The server has already dequeued every job in a
/// batch, so a fetched batch is always rendered and reported in full.
pub async fn run_worker(
    transport: Arc<dyn CoordinatorTransport>,
    oracle: Arc<dyn MembershipOracle>,
    render: RenderConfig,
    worker: String,
    cancel: Arc<dyn CancelToken>,
) -> Result<WorkerReport, WorkError> {
    let mut totals = WorkerReport::default();
    loop {
        if cancel.is_cancelled() {
            totals.cancelled = true;
            return Ok(totals);
        }

        let batch = transport.fetch_batch().await?;
        if batch.is_empty() {
            debug!(worker = %worker, batches = totals.batches, "No jobs left");
            return Ok(totals);
        }

        let frames = {
            let oracle = oracle.clone();
            let render = render.clone();
            tokio::task::spawn_blocking(move || {
                let mut frames = Vec::with_capacity(batch.len());
                for job in &batch.jobs {
                    let data = render_compressed(oracle.as_ref(), job.coordinate, &render)
                        .map_err(|e| WorkError::Render(e.to_string()))?;
                    frames.push(RenderedFrame {
                        index: job.index,
                        data,
                    });
                }
                Ok::<_, WorkError>(frames)
            })
            .await
            .map_err(|e| WorkError::Render(e.to_string()))??
        };

        totals.frames += frames.len();
        let report = CompletionReport {
            worker: worker.clone(),
            frames,
        };
        transport.report(&report).await?;
        totals.batches += 1;
    }
}

/// Totals across every worker loop of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientReport {
    pub workers: usize,
    pub failed: usize,
    pub batches: usize,
    pub frames: usize,
}

/// Check the server is up, clear a stale abort file, and run `config.workers` worker loops.
///
/// A failing worker is logged and the others carry on.
pub async fn run_client(
    transport: Arc<dyn CoordinatorTransport>,
    oracle: Arc<dyn MembershipOracle>,
    render: &RenderConfig,
    config: &CoordinatorConfig,
    abort: AbortFile,
) -> Result<ClientReport, ApiError> {
    transport.hello().await?;
    if abort.clear()? {
        info!(path = %abort.path().display(), "Removed stale abort file");
    }

    let name = config.resolved_worker_name();
    let workers = config.workers.max(1);
    let cancel: Arc<dyn CancelToken> = Arc::new(abort);
    info!(worker = %name, workers, "Starting render workers");

    let handles: Vec<_> = (0..workers)
        .map(|slot| {
            let transport = transport.clone();
            let oracle = oracle.clone();
            let render = render.clone();
            let name = name.clone();
            let cancel = cancel.clone();
            let handle = tokio::spawn(run_worker(transport, oracle, render, name, cancel));
            (slot, handle)
        })
        .collect();

    let mut report = ClientReport {
        workers,
        ..ClientReport::default()
    };
    for (slot, handle) in handles {
        match handle.await {
            Ok(Ok(totals)) => {
                report.batches += totals.batches;
                report.frames += totals.frames;
                if totals.cancelled {
                    warn!(slot, "Worker cancelled");
                }
            }
            Ok(Err(e)) => {
                error!(slot, error = %e, "Worker gave up");
                report.failed += 1;
            }
            Err(e) => {
                error!(slot, error = %e, "Worker task panicked");
                report.failed += 1;
            }
        }
    }
    info!(
        frames = report.frames,
        batches = report.batches,
        failed = report.failed,
        "Render workers finished"
    );
    Ok(report)
}
