//! Configuration System
//!
//! One immutable [`RunConfig`] is built per run and passed by reference to every component.
//! Sources are layered: built-in defaults, the global config file, the workspace config file,
//! then `EDGETRAIL__*` environment variables. Changing configuration means starting a new run.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::types::PlanePoint;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod sources;

pub use sources::global_file::global_config_path;
pub use sources::workspace_file::workspace_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub trace: TraceConfig,

    #[serde(default)]
    pub refine: RefineConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub thin: ThinConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sentinel file whose presence requests cooperative cancellation
    #[serde(default = "default_abort_file")]
    pub abort_file: PathBuf,
}

fn default_abort_file() -> PathBuf {
    PathBuf::from("abort.txt")
}

/// Boundary search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Lattice units per plane unit
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Iteration budget that defines membership while tracing
    #[serde(default = "default_border_iter")]
    pub border_iter: u32,

    /// Cost advance between forced checkpoints
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Minimum plane distance between consecutive trail points
    #[serde(default = "default_min_spacing")]
    pub min_spacing: f64,

    /// Visited-set generation size before rotation
    #[serde(default = "default_seen_threshold")]
    pub seen_threshold: usize,

    /// Number of membership answers kept by the classifier
    #[serde(default = "default_membership_cache")]
    pub membership_cache: usize,

    /// Plane x coordinate that releases the start gate
    #[serde(default = "default_unleash_x")]
    pub unleash_x: f64,

    /// How far (plane units) the start scan may travel before giving up
    #[serde(default = "default_scan_limit")]
    pub scan_limit: f64,

    /// Where the start scan begins
    #[serde(default = "default_origin")]
    pub origin: PlanePoint,

    /// Pass checkpointed points through the refiner
    #[serde(default)]
    pub refine: bool,

    /// Allow the closed-form cardioid and bulb membership shortcuts
    #[serde(default = "default_true")]
    pub use_shortcuts: bool,
}

fn default_scale() -> f64 {
    100_000.0
}

fn default_border_iter() -> u32 {
    500
}

fn default_checkpoint_interval() -> u64 {
    5000
}

fn default_min_spacing() -> f64 {
    1.0 / 400.0
}

fn default_seen_threshold() -> usize {
    100_000
}

fn default_membership_cache() -> usize {
    65_536
}

fn default_unleash_x() -> f64 {
    -1.95
}

fn default_scan_limit() -> f64 {
    4.0
}

fn default_origin() -> PlanePoint {
    PlanePoint::ORIGIN
}

fn default_true() -> bool {
    true
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            border_iter: default_border_iter(),
            checkpoint_interval: default_checkpoint_interval(),
            min_spacing: default_min_spacing(),
            seen_threshold: default_seen_threshold(),
            membership_cache: default_membership_cache(),
            unleash_x: default_unleash_x(),
            scan_limit: default_scan_limit(),
            origin: default_origin(),
            refine: false,
            use_shortcuts: true,
        }
    }
}

/// Local search settings for precision mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineConfig {
    #[serde(default = "default_rounds")]
    pub rounds: u32,

    /// Steps taken along each direction per round
    #[serde(default = "default_steps")]
    pub steps: u32,

    #[serde(default)]
    pub iteration_tolerance: u32,

    #[serde(default)]
    pub distance_tolerance: Option<f64>,

    /// Runs at or below this border budget keep the unrefined point on a miss
    #[serde(default = "default_fallback_max_iter")]
    pub fallback_max_iter: u32,
}

fn default_rounds() -> u32 {
    8
}

fn default_steps() -> u32 {
    5
}

fn default_fallback_max_iter() -> u32 {
    100
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            steps: default_steps(),
            iteration_tolerance: 0,
            distance_tolerance: None,
            fallback_max_iter: default_fallback_max_iter(),
        }
    }
}

/// Escape-map render settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_dimension")]
    pub width: u32,

    #[serde(default = "default_dimension")]
    pub height: u32,

    #[serde(default = "default_render_iter")]
    pub max_iter: u32,

    /// Plane width covered by a frame, centred on the origin
    #[serde(default = "default_extent")]
    pub extent: f64,
}

fn default_dimension() -> u32 {
    2000
}

fn default_render_iter() -> u32 {
    250
}

fn default_extent() -> f64 {
    4.0
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_dimension(),
            height: default_dimension(),
            max_iter: default_render_iter(),
            extent: default_extent(),
        }
    }
}

/// Greedy frame thinning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinConfig {
    #[serde(default = "default_target_frames")]
    pub target_frames: usize,

    /// Scale `target_frames` by this percentage
    #[serde(default)]
    pub target_percent: Option<f64>,

    /// Frames whose neighbours are farther apart than this are never removed
    #[serde(default = "default_spacing_threshold")]
    pub spacing_threshold: f64,

    /// Flag flips buffered before they are written
    #[serde(default = "default_thin_flush")]
    pub flush_every: usize,

    /// Write per-removal diff and distance statistics here (JSON lines)
    #[serde(default)]
    pub history_file: Option<PathBuf>,
}

fn default_target_frames() -> usize {
    15_000
}

fn default_spacing_threshold() -> f64 {
    0.01
}

fn default_thin_flush() -> usize {
    10_000
}

impl Default for ThinConfig {
    fn default() -> Self {
        Self {
            target_frames: default_target_frames(),
            target_percent: None,
            spacing_threshold: default_spacing_threshold(),
            flush_every: default_thin_flush(),
            history_file: None,
        }
    }
}

impl ThinConfig {
    /// Target frame count after applying `target_percent`
    pub fn effective_target(&self) -> usize {
        match self.target_percent {
            Some(percent) => (self.target_frames as f64 * (percent / 100.0)) as usize,
            None => self.target_frames,
        }
    }
}

/// Distributed render queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_server")]
    pub server: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Completed frames buffered by the server before a write
    #[serde(default = "default_flush_pending")]
    pub flush_pending: usize,

    /// Worker loops per client machine
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub worker_name: Option<String>,

    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    #[serde(default = "default_retry_step_ms")]
    pub retry_step_ms: u64,

    #[serde(default = "default_retry_cap_ms")]
    pub retry_cap_ms: u64,

    #[serde(default = "default_retry_deadline_secs")]
    pub retry_deadline_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0:5566".to_string()
}

fn default_server() -> String {
    "http://127.0.0.1:5566/".to_string()
}

fn default_batch_size() -> usize {
    5
}

fn default_flush_pending() -> usize {
    5000
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_retry_initial_ms() -> u64 {
    1000
}

fn default_retry_step_ms() -> u64 {
    5000
}

fn default_retry_cap_ms() -> u64 {
    30_000
}

fn default_retry_deadline_secs() -> u64 {
    300
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            server: default_server(),
            batch_size: default_batch_size(),
            flush_pending: default_flush_pending(),
            workers: default_workers(),
            worker_name: None,
            retry_initial_ms: default_retry_initial_ms(),
            retry_step_ms: default_retry_step_ms(),
            retry_cap_ms: default_retry_cap_ms(),
            retry_deadline_secs: default_retry_deadline_secs(),
        }
    }
}

impl CoordinatorConfig {
    /// Name this machine reports with completed batches
    pub fn resolved_worker_name(&self) -> String {
        self.worker_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "worker".to_string())
    }
}

/// Storage paths and write batching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_diff_flush_rows")]
    pub diff_flush_rows: usize,

    #[serde(default = "default_render_flush_rows")]
    pub render_flush_rows: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".edgetrail/frames.db")
}

fn default_diff_flush_rows() -> usize {
    25_000
}

fn default_render_flush_rows() -> usize {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            diff_flush_rows: default_diff_flush_rows(),
            render_flush_rows: default_render_flush_rows(),
        }
    }
}

impl StorageConfig {
    /// Database path resolved against the workspace root
    pub fn resolved_db_path(&self, workspace_root: &Path) -> PathBuf {
        if self.db_path.is_absolute() {
            self.db_path.clone()
        } else {
            workspace_root.join(&self.db_path)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Trace(String),
    Refine(String),
    Render(String),
    Thin(String),
    Coordinator(String),
    Storage(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Trace(msg) => write!(f, "trace: {}", msg),
            ValidationError::Refine(msg) => write!(f, "refine: {}", msg),
            ValidationError::Render(msg) => write!(f, "render: {}", msg),
            ValidationError::Thin(msg) => write!(f, "thin: {}", msg),
            ValidationError::Coordinator(msg) => write!(f, "coordinator: {}", msg),
            ValidationError::Storage(msg) => write!(f, "storage: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl RunConfig {
    /// Validate the entire configuration, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let trace = &self.trace;
        if !(trace.scale > 0.0) {
            errors.push(ValidationError::Trace("scale must be positive".to_string()));
        }
        if trace.border_iter == 0 {
            errors.push(ValidationError::Trace("border_iter must be positive".to_string()));
        }
        if trace.checkpoint_interval == 0 {
            errors.push(ValidationError::Trace(
                "checkpoint_interval must be positive".to_string(),
            ));
        }
        if !(trace.min_spacing >= 0.0) {
            errors.push(ValidationError::Trace("min_spacing must not be negative".to_string()));
        }
        if trace.seen_threshold == 0 {
            errors.push(ValidationError::Trace("seen_threshold must be positive".to_string()));
        }
        if !(trace.scan_limit > 0.0) {
            errors.push(ValidationError::Trace("scan_limit must be positive".to_string()));
        }
        if trace.unleash_x >= trace.origin.x {
            errors.push(ValidationError::Trace(format!(
                "unleash_x ({}) must lie left of the scan origin ({})",
                trace.unleash_x, trace.origin.x
            )));
        }

        if self.refine.rounds == 0 || self.refine.steps == 0 {
            errors.push(ValidationError::Refine(
                "rounds and steps must be positive".to_string(),
            ));
        }

        if self.render.width == 0 || self.render.height == 0 {
            errors.push(ValidationError::Render("dimensions must be positive".to_string()));
        }
        if self.render.max_iter == 0 || self.render.max_iter > 254 {
            errors.push(ValidationError::Render(format!(
                "max_iter must be within 1..=254 to fit one byte per pixel, got {}",
                self.render.max_iter
            )));
        }
        if !(self.render.extent > 0.0) {
            errors.push(ValidationError::Render("extent must be positive".to_string()));
        }

        if !(self.thin.spacing_threshold >= 0.0) {
            errors.push(ValidationError::Thin(
                "spacing_threshold must not be negative".to_string(),
            ));
        }
        if let Some(percent) = self.thin.target_percent {
            if !(percent.is_finite() && percent > 0.0) {
                errors.push(ValidationError::Thin(format!(
                    "target_percent must be a positive number, got {}",
                    percent
                )));
            }
        }
        if self.thin.flush_every == 0 {
            errors.push(ValidationError::Thin("flush_every must be positive".to_string()));
        }

        let coordinator = &self.coordinator;
        if coordinator.batch_size == 0 {
            errors.push(ValidationError::Coordinator(
                "batch_size must be positive".to_string(),
            ));
        }
        if coordinator.workers == 0 {
            errors.push(ValidationError::Coordinator("workers must be positive".to_string()));
        }
        if coordinator.retry_cap_ms < coordinator.retry_initial_ms {
            errors.push(ValidationError::Coordinator(
                "retry_cap_ms must be at least retry_initial_ms".to_string(),
            ));
        }

        if self.storage.db_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("db_path cannot be empty".to_string()));
        }
        if self.storage.diff_flush_rows == 0 || self.storage.render_flush_rows == 0 {
            errors.push(ValidationError::Storage(
                "flush row counts must be positive".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all problems into one configuration error
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}

/// Loads [`RunConfig`] from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace: defaults, global file, workspace file, environment
    pub fn load(workspace_root: &Path) -> Result<RunConfig, ApiError> {
        let mut builder = Config::builder().add_source(Config::try_from(&RunConfig::default())?);
        builder = sources::global_file::add_to_builder(builder)?;
        builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        builder = builder.add_source(Environment::with_prefix("EDGETRAIL").separator("__"));

        let config: RunConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Load a single configuration file on top of the defaults
    pub fn load_from_file(path: &Path) -> Result<RunConfig, ApiError> {
        let config: RunConfig = Config::builder()
            .add_source(Config::try_from(&RunConfig::default())?)
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}
