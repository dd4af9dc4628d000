//! Boundary tracing over the scaled lattice.
//!
//! The tracer walks the border of the set with a uniform-cost search whose memory is bounded
//! by a rotating visited set and by compacting the frontier arena at every checkpoint. The
//! output is a closed, spacing-filtered [`Trail`] of plane coordinates.

pub mod classifier;
pub mod frontier;
pub mod refine;
pub mod seen;
pub mod trail;
pub mod tracer;

pub use classifier::BorderClassifier;
pub use frontier::{Frontier, FrontierNode};
pub use refine::PointRefiner;
pub use seen::SeenCache;
pub use trail::{SurveyRow, Trail};
pub use tracer::{BoundaryTracer, TraceProgress, TraceStep};
