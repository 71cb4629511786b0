use crate::error::{Result, ShimError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Persistence for rewrite output (artifacts, mirrored segments, playlist)
///
/// Paths are relative to the store root and use `/` separators, matching the
/// references written into the playlist.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write `contents` at `relative_path`, creating parent directories.
    async fn put(&self, relative_path: &str, contents: &[u8]) -> Result<()>;
}

/// Filesystem-backed store rooted at the output directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative store path, refusing anything that escapes the root.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let relative = Path::new(relative_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if relative_path.is_empty() || escapes {
            return Err(ShimError::Config(format!(
                "store path must stay inside the output directory: {relative_path:?}"
            )));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, relative_path: &str, contents: &[u8]) -> Result<()> {
        let path = self.resolve(relative_path)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;

        debug!("Wrote {} bytes to {}", contents.len(), path.display());
        Ok(())
    }
}
