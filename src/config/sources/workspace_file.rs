//! Workspace config file source: <workspace>/edgetrail.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};

/// Path of the workspace config file.
pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join("edgetrail.toml")
}

/// Add the workspace config file to the builder. It overrides the global file.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let path = workspace_config_path(workspace_root);
    if path.exists() {
        return Ok(builder.add_source(File::from(path.as_path()).required(false)));
    }
    Ok(builder)
}
