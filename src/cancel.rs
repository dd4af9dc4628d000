//! Cooperative cancellation.
//!
//! Long-running loops poll a [`CancelToken`] between work units. The production token is
//! [`AbortFile`]: cancellation is requested by creating a sentinel file.

use std::path::{Path, PathBuf};

pub trait CancelToken: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    #[inline]
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<F> CancelToken for F
where
    F: Fn() -> bool + Send + Sync,
{
    #[inline]
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Cancellation requested by the presence of a sentinel file
#[derive(Debug, Clone)]
pub struct AbortFile {
    path: PathBuf,
}

impl AbortFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve a possibly relative sentinel path against the workspace root
    pub fn in_workspace(workspace_root: &Path, path: &Path) -> Self {
        if path.is_absolute() {
            Self::new(path)
        } else {
            Self::new(workspace_root.join(path))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove a stale sentinel left over from an earlier run
    pub fn clear(&self) -> std::io::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl CancelToken for AbortFile {
    fn is_cancelled(&self) -> bool {
        self.path.exists()
    }
}
