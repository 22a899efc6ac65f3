//! Per-run temporary path tracking.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Every path created during one run.
///
/// Paths are registered as they are created and deleted together when the
/// set is drained. A path marked with [`TempFileSet::retain`] is the run's
/// product and survives the drain. If the set is dropped without an explicit
/// drain (panic, cancellation, dropped future) it drains itself.
#[derive(Debug, Default)]
pub struct TempFileSet {
    paths: Vec<PathBuf>,
    retained: HashSet<PathBuf>,
    drained: bool,
}

impl TempFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `path` for deletion.
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Exclude `path` from deletion.
    pub fn retain(&mut self, path: &Path) {
        self.retained.insert(path.to_path_buf());
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Stop tracking every path without deleting anything, handing the
    /// registered paths back to the caller.
    pub fn release(mut self) -> Vec<PathBuf> {
        self.drained = true;
        std::mem::take(&mut self.paths)
    }

    /// Delete every registered, non-retained path. Returns how many files
    /// were actually removed.
    ///
    /// Missing files are ignored and other failures are logged; neither is
    /// reported to the caller. Only the first call does any work.
    pub fn drain(&mut self) -> usize {
        if self.drained {
            return 0;
        }
        self.drained = true;

        let mut removed = 0;
        for path in self.paths.drain(..) {
            if self.retained.contains(&path) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("Cleaned up temporary file: {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Failed to clean up file {}: {e}", path.display());
                }
            }
        }
        removed
    }
}

impl Drop for TempFileSet {
    fn drop(&mut self) {
        if !self.drained {
            let removed = self.drain();
            if removed > 0 {
                tracing::debug!("Drained {removed} abandoned temporary file(s)");
            }
        }
    }
}
