//! End-to-end pipeline: trace the border, load it as frames, render, diff, thin and export.
//!
//! Each step is resumable. Work already present in the frame store is skipped, so a run
//! stopped by the abort file picks up where it left off.

use crate::cancel::{AbortFile, CancelToken};
use crate::config::{RunConfig, ThinConfig};
use crate::error::ApiError;
use crate::oracle::{EscapeTimeOracle, MembershipOracle};
use crate::render::{populate_frames, PopulateReport};
use crate::store::{DiffCache, FrameFilter, FrameStore, PrecomputeReport, SledFrameStore};
use crate::thin::{GreedyThinner, ThinReport};
use crate::trace::{BoundaryTracer, Trail};
use crate::types::{FrameIndex, PlanePoint};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// One frame of the final output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalFrame {
    pub index: FrameIndex,
    pub x: f64,
    pub y: f64,
}

/// Shared state for running pipeline steps against one workspace
pub struct Pipeline {
    workspace: PathBuf,
    config: RunConfig,
    store: Arc<SledFrameStore>,
    oracle: Arc<dyn MembershipOracle>,
    abort: AbortFile,
}

impl Pipeline {
    /// Open the workspace's frame store with the native escape-time oracle
    pub fn open(workspace: &Path, config: RunConfig) -> Result<Self, ApiError> {
        let oracle = Arc::new(EscapeTimeOracle::new(config.trace.use_shortcuts));
        Self::with_oracle(workspace, config, oracle)
    }

    pub fn with_oracle(
        workspace: &Path,
        config: RunConfig,
        oracle: Arc<dyn MembershipOracle>,
    ) -> Result<Self, ApiError> {
        let db_path = config.storage.resolved_db_path(workspace);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Arc::new(SledFrameStore::new(&db_path)?);
        let abort = AbortFile::in_workspace(workspace, &config.abort_file);
        Ok(Self {
            workspace: workspace.to_path_buf(),
            config,
            store,
            oracle,
            abort,
        })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SledFrameStore> {
        &self.store
    }

    pub fn oracle(&self) -> &Arc<dyn MembershipOracle> {
        &self.oracle
    }

    pub fn abort(&self) -> &AbortFile {
        &self.abort
    }

    /// Trace the border into a closed trail
    pub fn trace(&self) -> Result<Trail, ApiError> {
        let mut tracer =
            BoundaryTracer::new(self.oracle.clone(), &self.config.trace, &self.config.refine)?;
        let trail = tracer.run(&self.abort)?;
        info!(points = trail.len(), "Border traced");
        Ok(trail)
    }

    /// Materialize frames for a trail; returns whether the store was reloaded
    pub fn load(&self, trail: &Trail) -> Result<bool, ApiError> {
        Ok(self.store.load_trail(trail.points())?)
    }

    /// Render every frame without an escape map on this machine
    pub fn render(&self) -> Result<PopulateReport, ApiError> {
        Ok(populate_frames(
            &self.store,
            self.oracle.as_ref(),
            &self.config.render,
            self.config.storage.render_flush_rows,
            &self.abort,
        )?)
    }

    /// Diff every adjacent pair of rendered frames not yet cached
    pub fn diffs(&self) -> Result<PrecomputeReport, ApiError> {
        let mut cache = DiffCache::open(self.store.clone())?;
        Ok(cache.precompute_adjacent(self.config.storage.diff_flush_rows, &self.abort)?)
    }

    /// Thin the live frames down to the configured target
    pub fn thin(&self) -> Result<ThinReport, ApiError> {
        self.thin_with(&self.config.thin)
    }

    pub fn thin_with(&self, thin: &ThinConfig) -> Result<ThinReport, ApiError> {
        let mut cache = DiffCache::open(self.store.clone())?;
        let mut thinner = GreedyThinner::new(self.store.as_ref(), &mut cache, thin)?;
        if let Some(path) = &thin.history_file {
            thinner.record_history_to(&self.workspace.join(path))?;
        }
        Ok(thinner.run(&self.abort)?)
    }
}

/// Write the live, rendered frames in index order as JSON; returns how many were written
pub fn write_final<S: FrameStore + ?Sized>(store: &S, output: &Path) -> Result<usize, ApiError> {
    let frames: Vec<FinalFrame> = store
        .iterate(FrameFilter::LIVE)?
        .into_iter()
        .map(|frame| FinalFrame {
            index: frame.index,
            x: frame.coordinate.x,
            y: frame.coordinate.y,
        })
        .collect();

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer(writer, &frames)?;
    info!(frames = frames.len(), path = %output.display(), "Created data file");
    Ok(frames.len())
}

/// Read back a file written by [`write_final`]
pub fn read_final(path: &Path) -> Result<Vec<PlanePoint>, ApiError> {
    let reader = std::io::BufReader::new(File::open(path)?);
    let frames: Vec<FinalFrame> = serde_json::from_reader(reader)?;
    Ok(frames
        .into_iter()
        .map(|frame| PlanePoint::new(frame.x, frame.y))
        .collect())
}

/// What [`run_all`] got through
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub traced: bool,
    pub trail_points: usize,
    pub reloaded: bool,
    pub rendered: usize,
    pub diffs_computed: usize,
    pub thin: Option<ThinReport>,
    pub written: Option<usize>,
    /// Step at which the abort file stopped the run
    pub aborted_before: Option<&'static str>,
}

/// Run every step, stopping between steps if the abort file appears.
///
/// The trail is read from `trail_path` when it exists; otherwise the border is traced and
/// saved there first.
pub fn run_all(
    pipeline: &Pipeline,
    trail_path: &Path,
    output: &Path,
) -> Result<RunReport, ApiError> {
    if pipeline.abort.clear()? {
        info!("Removed stale abort file");
    }
    let mut report = RunReport::default();
    let aborted = |step: &'static str, report: &mut RunReport| {
        if pipeline.abort.is_cancelled() {
            warn!(step, "Abort file detected");
            report.aborted_before = Some(step);
            true
        } else {
            false
        }
    };

    let trail = if trail_path.exists() {
        Trail::read_json(trail_path)?
    } else {
        let trail = pipeline.trace()?;
        trail.write_json(trail_path)?;
        report.traced = true;
        trail
    };
    report.trail_points = trail.len();

    if aborted("load", &mut report) {
        return Ok(report);
    }
    report.reloaded = pipeline.load(&trail)?;

    if aborted("render", &mut report) {
        return Ok(report);
    }
    report.rendered = pipeline.render()?.rendered;

    if aborted("diffs", &mut report) {
        return Ok(report);
    }
    report.diffs_computed = pipeline.diffs()?.computed;

    if aborted("thin", &mut report) {
        return Ok(report);
    }
    report.thin = Some(pipeline.thin()?);

    if aborted("write", &mut report) {
        return Ok(report);
    }
    report.written = Some(write_final(pipeline.store.as_ref(), output)?);
    Ok(report)
}
