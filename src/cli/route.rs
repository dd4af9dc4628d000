//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cancel::AbortFile;
use crate::config::{ConfigLoader, RunConfig};
use crate::coordinator::{self, CoordinatorTransport, HttpTransport, RetryPolicy};
use crate::error::ApiError;
use crate::oracle::{EscapeTimeOracle, MembershipOracle};
use crate::pipeline::{self, Pipeline};
use crate::trace::Trail;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::cli::help::{command_name, uses_store};
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_run_report, format_stats, format_survey, format_thin_report,
};

/// Runtime context for CLI execution: workspace and validated configuration.
/// Built from workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    workspace_root: PathBuf,
    config: RunConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        Self::with_config(workspace_root, config)
    }

    pub fn with_config(workspace_root: PathBuf, config: RunConfig) -> Result<Self, ApiError> {
        Ok(Self {
            workspace_root,
            config: config.validated()?,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Relative paths on the command line are taken relative to the workspace
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn abort_file(&self) -> AbortFile {
        AbortFile::in_workspace(&self.workspace_root, &self.config.abort_file)
    }

    fn runtime() -> Result<tokio::runtime::Runtime, ApiError> {
        Ok(tokio::runtime::Runtime::new()?)
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let name = command_name(command);
        info!(command = name, "Command started");
        let result = if uses_store(command) {
            let pipeline = Pipeline::open(&self.workspace_root, self.config.clone())?;
            self.execute_with_store(command, &pipeline)
        } else {
            self.execute_remote(command)
        };
        info!(
            command = name,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_with_store(&self, command: &Commands, pipeline: &Pipeline) -> Result<String, ApiError> {
        let store = pipeline.store();
        match command {
            Commands::Load { trail, spacing } => {
                let mut trail = Trail::read_json(&self.resolve(trail))?;
                if let Some(spacing) = spacing {
                    trail = trail.respace(*spacing);
                }
                let reloaded = pipeline.load(&trail)?;
                Ok(if reloaded {
                    format!("Created {} frames", trail.len())
                } else {
                    format!("Kept existing {} frames", store.count())
                })
            }
            Commands::Render => {
                let report = pipeline.render()?;
                Ok(format!(
                    "Rendered {} of {} pending frames{}",
                    report.rendered,
                    report.pending,
                    if report.cancelled { " (aborted)" } else { "" }
                ))
            }
            Commands::Diffs => {
                let report = pipeline.diffs()?;
                Ok(format!(
                    "Computed {} diffs, {} already cached, {} adjacent pairs{}",
                    report.computed,
                    report.cached,
                    report.pairs,
                    if report.cancelled { " (aborted)" } else { "" }
                ))
            }
            Commands::Thin {
                target,
                percent,
                history,
            } => {
                let mut config = self.config.clone();
                if let Some(target) = target {
                    config.thin.target_frames = *target;
                }
                if percent.is_some() {
                    config.thin.target_percent = *percent;
                }
                if let Some(history) = history {
                    config.thin.history_file = Some(self.resolve(history));
                }
                let config = config.validated()?;
                Ok(format_thin_report(&pipeline.thin_with(&config.thin)?))
            }
            Commands::Export { output } => {
                let written = pipeline::write_final(store.as_ref(), &self.resolve(output))?;
                Ok(format!("Created data file of {} frames", written))
            }
            Commands::Run { trail, output } => {
                let report =
                    pipeline::run_all(pipeline, &self.resolve(trail), &self.resolve(output))?;
                Ok(format_run_report(&report))
            }
            Commands::Serve { bind } => {
                let mut settings = self.config.coordinator.clone();
                if let Some(bind) = bind {
                    settings.bind = bind.clone();
                }
                let report = Self::runtime()?.block_on(coordinator::serve(
                    store.clone(),
                    &settings,
                    pipeline.abort().clone(),
                ))?;
                Ok(format!(
                    "Server stopped: {} frames accepted, {} of {} jobs never handed out",
                    report.accepted, report.remaining, report.queued
                ))
            }
            Commands::Stats { format } => format_stats(&store.stats()?, format),
            Commands::ResetUse => Ok(format!("Re-enabled {} frames", store.reset_use()?)),
            Commands::ResetDiffs => Ok(format!("Removed {} diffs", store.reset_diffs()?)),
            Commands::Trace { .. }
            | Commands::Survey { .. }
            | Commands::Work { .. }
            | Commands::Flush { .. } => self.execute_remote(command),
        }
    }

    fn execute_remote(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Trace { output } => {
                let oracle: Arc<dyn MembershipOracle> =
                    Arc::new(EscapeTimeOracle::new(self.config.trace.use_shortcuts));
                let mut tracer = crate::trace::BoundaryTracer::new(
                    oracle,
                    &self.config.trace,
                    &self.config.refine,
                )?;
                let trail = tracer.run(&self.abort_file())?;
                let path = self.resolve(output);
                trail.write_json(&path)?;
                Ok(format!("Wrote {} trail points to {}", trail.len(), path.display()))
            }
            Commands::Survey {
                trail,
                from,
                to,
                format,
            } => {
                let trail = Trail::read_json(&self.resolve(trail))?;
                format_survey(&trail.survey(*from..=*to), format)
            }
            Commands::Work { server, workers } => {
                let mut settings = self.config.coordinator.clone();
                if let Some(server) = server {
                    settings.server = server.clone();
                }
                if let Some(workers) = workers {
                    settings.workers = *workers;
                }
                let transport: Arc<dyn CoordinatorTransport> = Arc::new(HttpTransport::new(
                    &settings.server,
                    RetryPolicy::from_config(&settings),
                )?);
                let oracle: Arc<dyn MembershipOracle> =
                    Arc::new(EscapeTimeOracle::new(self.config.trace.use_shortcuts));
                let report = Self::runtime()?.block_on(coordinator::run_client(
                    transport,
                    oracle,
                    &self.config.render,
                    &settings,
                    self.abort_file(),
                ))?;
                Ok(format!(
                    "Rendered {} frames in {} batches across {} workers ({} failed)",
                    report.frames, report.batches, report.workers, report.failed
                ))
            }
            Commands::Flush { server } => {
                let server = server
                    .clone()
                    .unwrap_or_else(|| self.config.coordinator.server.clone());
                let transport =
                    HttpTransport::new(&server, RetryPolicy::from_config(&self.config.coordinator))?;
                Ok(Self::runtime()?.block_on(transport.flush())?)
            }
            _ => Err(ApiError::ConfigError(format!(
                "Command '{}' needs the frame store",
                command_name(command)
            ))),
        }
    }
}
