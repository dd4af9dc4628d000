//! Edgetrail: Mandelbrot border tracing and frame thinning
//!
//! Traces the border of the Mandelbrot set into a closed trail of plane coordinates, renders a
//! Julia-set frame for every trail point, and greedily thins the frame sequence down to a
//! target count using cached pixel diffs between neighbouring frames. Rendering can be spread
//! over several machines through a small pull-based job server.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod oracle;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod store;
pub mod thin;
pub mod trace;
pub mod types;

pub use error::{ApiError, StorageError, TraceError, WorkError};
pub use types::{FrameIndex, LatticePoint, Offset, PlanePoint};
