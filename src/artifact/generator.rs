use crate::artifact::codec::encode_artifact;
use crate::hls::parser::PlaylistLine;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};
use url::Url;

/// File extension of indirection artifacts
pub const ARTIFACT_EXTENSION: &str = "js";

/// How artifact names are derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArtifactNaming {
    /// `segment_<n>.js`, n = 0-based position among segment lines
    #[default]
    Position,
    /// Source file name with its extension replaced by `.js`
    SourceName,
}

/// A generated artifact, ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectionArtifact {
    /// File name, unique within one batch
    pub name: String,
    /// Artifact body (see [`crate::artifact::codec`])
    pub encoded_payload: String,
    /// Origin URL embedded in the payload
    pub origin_url: String,
    /// 0-based position of the segment among the playlist's segments
    pub ordinal: usize,
}

impl IndirectionArtifact {
    /// Name without the `.js` extension
    pub fn stem(&self) -> &str {
        self.name
            .strip_suffix(ARTIFACT_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .unwrap_or(&self.name)
    }
}

/// Output of [`generate`]
#[derive(Debug, Clone, Default)]
pub struct GeneratedArtifacts {
    /// Artifacts in playlist order
    pub artifacts: Vec<IndirectionArtifact>,
    /// Playlist line index to position in `artifacts`
    pub by_line: BTreeMap<usize, usize>,
}

impl GeneratedArtifacts {
    /// Artifact generated for the segment on playlist line `line`
    pub fn for_line(&self, line: usize) -> Option<&IndirectionArtifact> {
        self.by_line.get(&line).map(|&i| &self.artifacts[i])
    }

    /// Line index to artifact pairs, in playlist order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &IndirectionArtifact)> {
        self.by_line.iter().map(|(&line, &i)| (line, &self.artifacts[i]))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Generate artifacts for the first `limit` segment references.
///
/// Segments past the limit get no artifact. Names depend only on segment
/// position and source URL, so identical input yields identical output.
pub fn generate(lines: &[PlaylistLine], limit: usize, naming: ArtifactNaming) -> GeneratedArtifacts {
    let mut generated = GeneratedArtifacts::default();
    let mut taken: HashSet<String> = HashSet::new();

    let segments = lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| line.resolved_url().map(|url| (index, url)));

    for (ordinal, (line_index, resolved_url)) in segments.enumerate().take(limit) {
        let stem = unique_stem(artifact_stem(resolved_url, ordinal, naming), ordinal, &taken);
        let name = format!("{stem}.{ARTIFACT_EXTENSION}");
        taken.insert(stem);

        let origin_url = resolved_url.replace('"', "%22");
        debug!("Artifact {} -> {}", name, origin_url);

        generated.by_line.insert(line_index, generated.artifacts.len());
        generated.artifacts.push(IndirectionArtifact {
            encoded_payload: encode_artifact(&origin_url),
            name,
            origin_url,
            ordinal,
        });
    }

    info!("Generated {} indirection artifacts", generated.len());
    generated
}

fn artifact_stem(resolved_url: &str, ordinal: usize, naming: ArtifactNaming) -> String {
    match naming {
        ArtifactNaming::Position => format!("segment_{ordinal}"),
        ArtifactNaming::SourceName => source_stem(resolved_url)
            .map(|stem| sanitize(&stem))
            .filter(|stem| !stem.is_empty() && stem != "." && stem != "..")
            .unwrap_or_else(|| format!("segment_{ordinal}")),
    }
}

fn unique_stem(stem: String, ordinal: usize, taken: &HashSet<String>) -> String {
    if !taken.contains(&stem) {
        return stem;
    }
    (ordinal..)
        .map(|n| format!("{stem}_{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| format!("{stem}_{ordinal}"))
}

/// Basename of the URL path without its extension
fn source_stem(resolved_url: &str) -> Option<String> {
    let path = match Url::parse(resolved_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => resolved_url
            .split(['?', '#'])
            .next()
            .unwrap_or(resolved_url)
            .to_string(),
    };

    let basename = path.rsplit('/').next()?;
    let stem = match basename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => basename,
    };
    Some(stem.to_string())
}

/// Restrict to characters safe in both file names and relative URLs
fn sanitize(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Extension of the URL path's final segment, if any
pub fn source_extension(resolved_url: &str) -> Option<String> {
    let url = Url::parse(resolved_url).ok()?;
    let basename = url.path().rsplit('/').next()?;
    let (stem, ext) = basename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(sanitize(ext))
}
