pub mod codec;
pub mod generator;
pub mod store;

pub use codec::{encode_artifact, extract_origin_url};
pub use generator::{ArtifactNaming, GeneratedArtifacts, IndirectionArtifact, generate};
pub use store::{ArtifactStore, FsArtifactStore};

use std::collections::BTreeMap;

/// Where artifacts live relative to the output playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// Subdirectory next to the output playlist, e.g. `segments`
    pub subdir: String,
}

impl ArtifactLayout {
    pub fn new(subdir: impl Into<String>) -> Self {
        let subdir: String = subdir.into();
        Self {
            subdir: subdir.trim_matches('/').to_string(),
        }
    }

    /// Playlist reference (and store path) for an artifact file name
    pub fn reference(&self, name: &str) -> String {
        if self.subdir.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.subdir, name)
        }
    }

    /// Line index to playlist reference for every generated artifact
    pub fn references(&self, generated: &GeneratedArtifacts) -> BTreeMap<usize, String> {
        generated
            .iter()
            .map(|(line, artifact)| (line, self.reference(&artifact.name)))
            .collect()
    }
}
