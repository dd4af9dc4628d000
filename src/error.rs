//! Error types for the border tracer and frame thinning pipeline.

use crate::types::{FrameIndex, LatticePoint};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Frame not found: {0}")]
    FrameNotFound(FrameIndex),

    #[error("Frame {0} has no escape map")]
    MissingEscapeMap(FrameIndex),

    #[error("Frame {0} already exists")]
    DuplicateFrame(FrameIndex),

    #[error("Conflicting diff for ({a}, {b}): stored {stored}, new {new}")]
    DiffConflict {
        a: FrameIndex,
        b: FrameIndex,
        stored: u64,
        new: u64,
    },

    #[error("Escape map size mismatch: {0} vs {1} pixels")]
    EscapeMapMismatch(usize, usize),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Fatal errors raised by the boundary tracer
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("No border point found scanning from {origin:?} within {limit} lattice units")]
    NoStartFound { origin: LatticePoint, limit: i64 },

    #[error("The start {start:?} and end {end:?} don't connect")]
    Disconnected { start: LatticePoint, end: LatticePoint },

    #[error("Frontier exhausted after {pops} pops without reaching {end:?}")]
    FrontierExhausted { end: LatticePoint, pops: u64 },

    #[error("Unleash gate at x={unleash_x} is not left of the start at x={start_x}")]
    InvalidGate { unleash_x: f64, start_x: f64 },

    #[error("Trace cancelled")]
    Cancelled,
}

/// Errors raised by the distributed render queue
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server unavailable after retrying for {0:?}")]
    ServerUnavailable(std::time::Duration),

    #[error("Unexpected response from server: {0}")]
    UnexpectedResponse(String),

    #[error("Malformed payload: {0}")]
    Payload(#[from] bincode::Error),

    #[error("Render task failed: {0}")]
    Render(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Top level errors surfaced by the pipeline and CLI
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Trace failed: {0}")]
    TraceError(#[from] TraceError),

    #[error("Work queue error: {0}")]
    WorkError(#[from] WorkError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
