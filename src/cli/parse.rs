//! CLI parse: clap types for edgetrail. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Edgetrail CLI - trace the Mandelbrot border and thin its rendered frames
#[derive(Parser)]
#[command(name = "edgetrail")]
#[command(about = "Trace the Mandelbrot border into a closed trail and thin its rendered frames")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging
    #[arg(long, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trace the border into a closed trail
    Trace {
        /// Where to write the trail (JSON)
        #[arg(long, default_value = "trail.json")]
        output: PathBuf,
    },
    /// Report how many points each trail spacing would yield
    Survey {
        #[arg(long, default_value = "trail.json")]
        trail: PathBuf,
        /// Smallest trail length (spacing is 1 / length)
        #[arg(long, default_value = "100")]
        from: u32,
        /// Largest trail length
        #[arg(long, default_value = "1000")]
        to: u32,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Create frames from a trail
    Load {
        #[arg(long, default_value = "trail.json")]
        trail: PathBuf,
        /// Re-space the trail to this minimum spacing first
        #[arg(long)]
        spacing: Option<f64>,
    },
    /// Render every frame without an escape map on this machine
    Render,
    /// Compute diffs between adjacent rendered frames
    Diffs,
    /// Thin the live frames down to the target count
    Thin {
        /// Target frame count (overrides config)
        #[arg(long)]
        target: Option<usize>,
        /// Scale the target by this percentage
        #[arg(long)]
        percent: Option<f64>,
        /// Record diff and distance statistics before every removal (JSON lines)
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Write the surviving frames as JSON
    Export {
        #[arg(long, default_value = "final.json")]
        output: PathBuf,
    },
    /// Run every step: trace or load, render, diffs, thin, export
    Run {
        #[arg(long, default_value = "trail.json")]
        trail: PathBuf,
        #[arg(long, default_value = "final.json")]
        output: PathBuf,
    },
    /// Serve unrendered frames to remote workers
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Render frames for a remote server
    Work {
        /// Server base URL (overrides config)
        #[arg(long)]
        server: Option<String>,
        /// Worker loops on this machine (overrides config)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Ask a running server to write its pending frames
    Flush {
        #[arg(long)]
        server: Option<String>,
    },
    /// Show frame store statistics
    Stats {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Mark every frame as used again
    ResetUse,
    /// Drop every cached diff
    ResetDiffs,
}
