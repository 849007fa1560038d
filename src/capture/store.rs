use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::types::Frame;

/// Writes one PNG per turn under `<dir>/<prefix><turn:04>.png`.
#[derive(Debug, Clone)]
pub struct FrameStore {
    dir: PathBuf,
    prefix: String,
}

impl FrameStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, turn: u32) -> PathBuf {
        self.dir.join(format!("{}{:04}.png", self.prefix, turn))
    }

    /// Persist the frame and return the reference recorded in history.
    pub async fn save(&self, frame: &Frame) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path_for(frame.turn());
        fs::write(&path, frame.bytes())
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path.to_string_lossy().to_string())
    }
}
