//! Render job server.
//!
//! Holds the unrendered frames in memory and hands them out in small batches. Completed escape
//! maps are buffered and written to the frame store by whichever request pushes the buffer
//! past `flush_pending`, always under the queue lock, so there is a single writer.

use crate::cancel::{AbortFile, CancelToken};
use crate::config::CoordinatorConfig;
use crate::coordinator::protocol::{
    decode, CompletionReport, JobBatch, RenderJob, DONE_REPLY, HELLO_REPLY,
};
use crate::error::{ApiError, StorageError, WorkError};
use crate::store::{FrameFilter, FrameStore, SledFrameStore};
use crate::types::FrameIndex;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// How often per-worker throughput is logged
const THROUGHPUT_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// How often the server polls the abort sentinel
const ABORT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct JobQueue {
    store: Arc<SledFrameStore>,
    jobs: VecDeque<RenderJob>,
    pending: Vec<(FrameIndex, Vec<u8>)>,
    batch_size: usize,
    flush_pending: usize,
    recently_done: BTreeMap<String, usize>,
    accepted: usize,
}

pub type SharedQueue = Arc<Mutex<JobQueue>>;

impl JobQueue {
    pub fn new(
        store: Arc<SledFrameStore>,
        jobs: impl IntoIterator<Item = RenderJob>,
        batch_size: usize,
        flush_pending: usize,
    ) -> Self {
        Self {
            store,
            jobs: jobs.into_iter().collect(),
            pending: Vec::new(),
            batch_size: batch_size.max(1),
            flush_pending: flush_pending.max(1),
            recently_done: BTreeMap::new(),
            accepted: 0,
        }
    }

    /// Queue every frame that has no escape map yet
    pub fn from_store(
        store: Arc<SledFrameStore>,
        config: &CoordinatorConfig,
    ) -> Result<Self, StorageError> {
        let jobs: Vec<RenderJob> = store
            .iterate(FrameFilter::UNRENDERED)?
            .into_iter()
            .map(|frame| RenderJob {
                index: frame.index,
                coordinate: frame.coordinate,
            })
            .collect();
        Ok(Self::new(store, jobs, config.batch_size, config.flush_pending))
    }

    /// Jobs not yet handed out
    pub fn remaining(&self) -> usize {
        self.jobs.len()
    }

    /// Completed frames not yet written
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Frames accepted since the server started
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Pop up to `batch_size` jobs. Jobs are handed out once; an empty batch means done.
    pub fn next_batch(&mut self) -> JobBatch {
        let take = self.batch_size.min(self.jobs.len());
        JobBatch {
            jobs: self.jobs.drain(..take).collect(),
        }
    }

    /// Buffer a worker's completed frames, writing them out once enough are pending
    pub fn accept_report(&mut self, report: CompletionReport) -> Result<usize, StorageError> {
        let count = report.frames.len();
        *self.recently_done.entry(report.worker).or_default() += count;
        self.accepted += count;
        self.pending
            .extend(report.frames.into_iter().map(|frame| (frame.index, frame.data)));
        if self.pending.len() >= self.flush_pending {
            self.flush()?;
        }
        Ok(count)
    }

    /// Write all pending frames; returns how many were buffered
    pub fn flush(&mut self) -> Result<usize, StorageError> {
        let count = self.pending.len();
        if count > 0 {
            let stored = self.store.store_escape_maps(&self.pending)?;
            self.store.flush()?;
            debug!(count, stored, "Flushed completed frames");
            self.pending.clear();
        }
        Ok(count)
    }

    /// Per-worker frame counts since the last call
    pub fn take_counters(&mut self) -> BTreeMap<String, usize> {
        std::mem::take(&mut self.recently_done)
    }
}

type HandlerError = (StatusCode, String);

fn internal(error: impl std::fmt::Display) -> HandlerError {
    error!(%error, "Request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}

async fn hello() -> &'static str {
    HELLO_REPLY
}

async fn get_batch(State(queue): State<SharedQueue>) -> Result<Vec<u8>, HandlerError> {
    // The lock can be held across a store flush
    let batch = tokio::task::spawn_blocking(move || queue.lock().next_batch())
        .await
        .map_err(internal)?;
    batch.to_body().map_err(internal)
}

async fn done(State(queue): State<SharedQueue>, body: Bytes) -> Result<&'static str, HandlerError> {
    let report: CompletionReport = decode(&body).map_err(|e| {
        error!(error = %e, "Rejected malformed report");
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;
    tokio::task::spawn_blocking(move || queue.lock().accept_report(report))
        .await
        .map_err(internal)?
        .map_err(internal)?;
    Ok(DONE_REPLY)
}

async fn flush(State(queue): State<SharedQueue>) -> Result<String, HandlerError> {
    let count = tokio::task::spawn_blocking(move || queue.lock().flush())
        .await
        .map_err(internal)?
        .map_err(internal)?;
    Ok(format!("Flushed {} items", count))
}

/// Routes `/hello`, `/get`, `/done` and `/flush`
pub fn router(queue: SharedQueue) -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/get", get(get_batch))
        .route("/done", post(done))
        .route("/flush", get(flush).post(flush))
        .with_state(queue)
}

/// What a server run handed out and stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeReport {
    pub queued: usize,
    pub accepted: usize,
    pub remaining: usize,
}

/// Serve render jobs on an already bound listener until `abort` appears.
///
/// Pending frames are flushed before returning.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    queue: SharedQueue,
    abort: AbortFile,
) -> Result<ServeReport, ApiError> {
    let queued = queue.lock().remaining();
    let address = listener.local_addr()?;
    info!(%address, jobs = queued, "Render server listening");

    let reporter = {
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(THROUGHPUT_LOG_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (counters, remaining, pending) = {
                    let mut queue = queue.lock();
                    (queue.take_counters(), queue.remaining(), queue.pending())
                };
                for (worker, frames) in counters {
                    info!(worker = %worker, frames, "Recently done");
                }
                info!(remaining, pending, "Render queue");
            }
        })
    };

    let shutdown = async move {
        let mut ticker = tokio::time::interval(ABORT_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if abort.is_cancelled() {
                info!(path = %abort.path().display(), "Abort file found, shutting down");
                break;
            }
        }
    };

    let served = axum::serve(listener, router(queue.clone()))
        .with_graceful_shutdown(shutdown)
        .await;
    reporter.abort();
    served?;

    let final_queue = queue.clone();
    let (accepted, remaining) = tokio::task::spawn_blocking(move || {
        let mut queue = final_queue.lock();
        queue.flush().map(|_| (queue.accepted(), queue.remaining()))
    })
    .await
    .map_err(|e| WorkError::Render(e.to_string()))??;

    Ok(ServeReport {
        queued,
        accepted,
        remaining,
    })
}

/// Bind `config.bind` and serve every unrendered frame in `store`.
///
/// A stale abort file is removed first.
pub async fn serve(
    store: Arc<SledFrameStore>,
    config: &CoordinatorConfig,
    abort: AbortFile,
) -> Result<ServeReport, ApiError> {
    if abort.clear()? {
        info!(path = %abort.path().display(), "Removed stale abort file");
    }
    let queue = JobQueue::from_store(store, config)?;
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    serve_on(listener, Arc::new(Mutex::new(queue)), abort).await
}
