//! Temp-file side channel for downloading the last text response

use crate::error::{Result, StudioError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Writes responses to `.md` files in the OS temp directory and removes every
/// file it created on [`cleanup`](DownloadTracker::cleanup) or drop.
#[derive(Debug, Default)]
pub struct DownloadTracker {
    dir: Option<PathBuf>,
    files: Vec<PathBuf>,
}

impl DownloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track files in `dir` instead of the OS temp directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            files: Vec::new(),
        }
    }

    /// Write `text` to a new tracked file and return its path
    pub fn save(&mut self, text: &str) -> Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("studio-").suffix(".md");
        let mut file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(text.as_bytes())?;
        let (_, path) = file
            .keep()
            .map_err(|e| StudioError::Io(e.error))?;

        info!("Created and tracking temp file: {}", path.display());
        self.files.push(path.clone());
        Ok(path)
    }

    /// Most recently written file
    pub fn last(&self) -> Option<&Path> {
        self.files.last().map(PathBuf::as_path)
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.files
    }

    /// Delete every tracked file. Files already gone are ignored.
    pub fn cleanup(&mut self) {
        if self.files.is_empty() {
            return;
        }

        info!("Cleaning up {} temporary files...", self.files.len());
        for path in self.files.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Error removing {}: {}", path.display(), e),
            }
        }
        info!("Cleanup complete.");
    }
}

impl Drop for DownloadTracker {
    fn drop(&mut self) {
        self.cleanup();
    }
}
