use crate::scrapers::Snapshot;
use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes diagnostic snapshots of pages that failed
pub struct DebugArtifacts {
    dir: PathBuf,
}

impl DebugArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a snapshot as `<timestamp>_<reason>.<ext>`
    pub fn save(&self, reason: &str, snapshot: &Snapshot) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
        let mut path = self
            .dir
            .join(format!("{}_{}.{}", stamp, reason, snapshot.extension()));
        let mut n = 2;
        while path.exists() {
            path = self
                .dir
                .join(format!("{}_{}_{}.{}", stamp, reason, n, snapshot.extension()));
            n += 1;
        }

        std::fs::write(&path, snapshot.bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Saved debug snapshot");
        Ok(path)
    }
}
