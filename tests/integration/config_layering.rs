//! Integration tests for layered configuration loading

use edgetrail::cli::RunContext;
use edgetrail::config::sources::workspace_file::workspace_config_path;
use edgetrail::config::{ConfigLoader, RunConfig};
use edgetrail::ApiError;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_workspace_file_overrides_defaults() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        workspace_config_path(temp_dir.path()),
        r#"
[render]
width = 64
height = 48

[coordinator]
batch_size = 9
retry_deadline_secs = 30
"#,
    )
    .unwrap();

    let config = ConfigLoader::load(temp_dir.path()).unwrap();
    let defaults = RunConfig::default();
    assert_eq!(config.render.width, 64);
    assert_eq!(config.render.height, 48);
    assert_eq!(config.render.max_iter, defaults.render.max_iter);
    assert_eq!(config.coordinator.batch_size, 9);
    assert_eq!(config.coordinator.retry_deadline_secs, 30);
    assert_eq!(config.thin.target_frames, defaults.thin.target_frames);
}

#[test]
fn test_missing_workspace_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = ConfigLoader::load(temp_dir.path()).unwrap();
    assert_eq!(config.storage.db_path, RunConfig::default().storage.db_path);
    assert!(config.validate().is_ok());
}

#[test]
fn test_explicit_file_wins_over_workspace_file() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        workspace_config_path(temp_dir.path()),
        "[thin]\ntarget_frames = 10\n",
    )
    .unwrap();
    let explicit = temp_dir.path().join("other.toml");
    std::fs::write(&explicit, "[thin]\ntarget_frames = 20\n").unwrap();

    let context = RunContext::new(temp_dir.path().to_path_buf(), Some(explicit)).unwrap();
    assert_eq!(context.config().thin.target_frames, 20);

    let context = RunContext::new(temp_dir.path().to_path_buf(), None).unwrap();
    assert_eq!(context.config().thin.target_frames, 10);
}

#[test]
fn test_invalid_values_are_rejected_at_context_creation() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        workspace_config_path(temp_dir.path()),
        "[render]\nmax_iter = 1000\n\n[storage]\ndiff_flush_rows = 0\n",
    )
    .unwrap();

    match RunContext::new(temp_dir.path().to_path_buf(), None) {
        Err(ApiError::ConfigError(message)) => {
            assert!(message.contains("max_iter"));
            assert!(message.contains("flush row counts"));
        }
        other => panic!("expected a configuration error, got {:?}", other.err()),
    }
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[trace\nscale = ").unwrap();
    assert!(ConfigLoader::load_from_file(&path).is_err());
    assert!(ConfigLoader::load_from_file(&PathBuf::from("/nonexistent/edgetrail.toml")).is_err());
}
