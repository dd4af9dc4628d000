//! CLI help and command-name contract for logging and routing.

use crate::cli::parse::Commands;

/// Command name as used in log events (e.g. "reset_use")
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Trace { .. } => "trace",
        Commands::Survey { .. } => "survey",
        Commands::Load { .. } => "load",
        Commands::Render => "render",
        Commands::Diffs => "diffs",
        Commands::Thin { .. } => "thin",
        Commands::Export { .. } => "export",
        Commands::Run { .. } => "run",
        Commands::Serve { .. } => "serve",
        Commands::Work { .. } => "work",
        Commands::Flush { .. } => "flush",
        Commands::Stats { .. } => "stats",
        Commands::ResetUse => "reset_use",
        Commands::ResetDiffs => "reset_diffs",
    }
}

/// Whether the command needs the frame store
pub fn uses_store(command: &Commands) -> bool {
    !matches!(
        command,
        Commands::Trace { .. } | Commands::Survey { .. } | Commands::Work { .. } | Commands::Flush { .. }
    )
}
