//! Distributed rendering: a pull-based job server and the worker clients that feed it.

pub mod client;
pub mod protocol;
pub mod retry;
pub mod server;

pub use client::{
    run_client, run_worker, ClientReport, CoordinatorTransport, HttpTransport, WorkerReport,
};
pub use protocol::{CompletionReport, JobBatch, RenderJob, RenderedFrame};
pub use retry::RetryPolicy;
pub use server::{router, serve, serve_on, JobQueue, ServeReport, SharedQueue};
