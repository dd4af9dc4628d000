//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, TraceError, WorkError};

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::WorkError(WorkError::ServerUnavailable(_)) => {
            format!("{} (is `edgetrail serve` running?)", e)
        }
        ApiError::TraceError(TraceError::Cancelled) => {
            "Trace cancelled by abort file; remove it and run again".to_string()
        }
        _ => e.to_string(),
    }
}
