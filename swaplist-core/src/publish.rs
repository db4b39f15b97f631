use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::SwapResult;
use crate::pipeline::RecombinationPipeline;
use crate::playlist::PlaylistEntry;

/// A shared output directory where jobs drop archives and thumbnails.
///
/// Names carry a random suffix so concurrent jobs never collide.
#[derive(Debug, Clone)]
pub struct Publisher {
    directory: PathBuf,
    config: EngineConfig,
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

impl Publisher {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_config(directory, EngineConfig::default())
    }

    pub fn with_config(directory: impl Into<PathBuf>, config: EngineConfig) -> Self {
        Self {
            directory: directory.into(),
            config,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn ensure_directory(&self) -> SwapResult<()> {
        if !self.directory.exists() {
            fs::create_dir_all(&self.directory)?;
            debug!(path = %self.directory.display(), "Created publish directory");
        }
        Ok(())
    }

    /// `swap_playlist_<8 hex>.3mf` inside the directory.
    pub fn archive_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}{}.3mf", self.config.archive_prefix, short_id()))
    }

    /// `thumb_<8 hex>_<name>` inside the directory.
    pub fn thumbnail_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!(
            "{}{}_{}",
            self.config.thumbnail_prefix,
            short_id(),
            name
        ))
    }

    /// Copies a thumbnail into the directory and returns where it landed.
    pub fn publish_thumbnail(&self, source: &Path) -> SwapResult<PathBuf> {
        self.ensure_directory()?;
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("thumbnail.png");
        let target = self.thumbnail_path(name);
        fs::copy(source, &target)?;
        debug!(from = %source.display(), to = %target.display(), "Published thumbnail");
        Ok(target)
    }

    /// Runs a merge job into a freshly named archive.
    pub fn publish_swap(&self, playlist: &[PlaylistEntry]) -> SwapResult<PathBuf> {
        self.ensure_directory()?;
        let target = self.archive_path();
        let output = RecombinationPipeline::new(self.config.clone()).run(playlist, &target)?;
        info!(path = %output.display(), "Published swap archive");
        Ok(output)
    }
}
