//! One rewrite run: fetch a media playlist, publish indirection artifacts
//! for its first segments and write the rewritten playlist next to them.
//!
//! The run is strictly ordered. Artifacts (or mirrored segments) are stored
//! before the playlist, so a playlist on disk never references a file that
//! was not written. A failure aborts the run; files already written stay.

use crate::artifact::generator::{GeneratedArtifacts, IndirectionArtifact, source_extension};
use crate::artifact::{ArtifactLayout, ArtifactNaming, ArtifactStore, generate};
use crate::error::{Result, ShimError};
use crate::fetch::{Fetcher, redact_url};
use crate::hls::{
    ParseOptions, PlaylistLine, TruncationPolicy, ensure_media_playlist, parse_playlist_with,
    rewrite_playlist,
};
use futures_util::{StreamExt, TryStreamExt, stream};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Default maximum number of segments kept in the output playlist
pub const DEFAULT_MAX_SEGMENTS: usize = 20;
/// Default output playlist file name
pub const DEFAULT_PLAYLIST_NAME: &str = "playlist.m3u8";
/// Default artifact subdirectory
pub const DEFAULT_ARTIFACT_DIR: &str = "segments";
/// Extension used for mirrored segments whose URL has none
const FALLBACK_SEGMENT_EXTENSION: &str = "ts";

/// What gets published for each selected segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Indirection artifacts naming the origin URL
    #[default]
    Indirect,
    /// The segment bytes themselves, fetched at rewrite time
    Mirror,
}

/// Knobs for one rewrite run
#[derive(Debug, Clone)]
pub struct RewriteOptions {
    /// Maximum number of segments kept, must be at least 1
    pub limit: usize,
    pub layout: ArtifactLayout,
    pub naming: ArtifactNaming,
    pub truncation: TruncationPolicy,
    pub parse: ParseOptions,
    pub mode: OutputMode,
    /// Concurrent segment fetches in [`OutputMode::Mirror`]
    pub prefetch_concurrency: usize,
    /// Output playlist path relative to the store root
    pub playlist_name: String,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_MAX_SEGMENTS,
            layout: ArtifactLayout::new(DEFAULT_ARTIFACT_DIR),
            naming: ArtifactNaming::default(),
            truncation: TruncationPolicy::default(),
            parse: ParseOptions::default(),
            mode: OutputMode::default(),
            prefetch_concurrency: 1,
            playlist_name: DEFAULT_PLAYLIST_NAME.to_string(),
        }
    }
}

/// The in-memory result of planning a rewrite, before anything is stored
#[derive(Debug, Clone)]
pub struct RewritePlan {
    pub lines: Vec<PlaylistLine>,
    pub artifacts: GeneratedArtifacts,
    /// Store path of the published file for each artifact, in playlist order
    pub files: Vec<String>,
    /// Rewritten playlist text
    pub playlist: String,
}

impl RewritePlan {
    pub fn segments_total(&self) -> usize {
        self.lines.iter().filter(|l| l.is_segment()).count()
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteSummary {
    pub source_url: String,
    pub segments_total: usize,
    pub segments_selected: usize,
    /// Store paths written for the selected segments, in playlist order
    pub files: Vec<String>,
    /// Store path of the rewritten playlist
    pub playlist_path: String,
}

/// Plan a rewrite of `content`, fetched from `base_url`. No I/O.
///
/// # Errors
/// - [`ShimError::Config`] when `limit` is zero
/// - [`ShimError::UnsupportedPlaylist`] for master playlists
/// - [`ShimError::Parse`] when `base_url` cannot act as a base URL
pub fn plan_rewrite(content: &str, base_url: &str, options: &RewriteOptions) -> Result<RewritePlan> {
    if options.limit == 0 {
        return Err(ShimError::Config(
            "segment limit must be at least 1".to_string(),
        ));
    }

    ensure_media_playlist(content)?;
    let lines = parse_playlist_with(content, base_url, options.parse)?;
    let artifacts = generate(&lines, options.limit, options.naming);

    let mut references = BTreeMap::new();
    let mut files = Vec::with_capacity(artifacts.len());
    for (line, artifact) in artifacts.iter() {
        let reference = options
            .layout
            .reference(&published_name(artifact, options.mode));
        files.push(reference.clone());
        references.insert(line, reference);
    }

    let playlist = rewrite_playlist(&lines, &references, options.truncation);

    Ok(RewritePlan {
        lines,
        artifacts,
        files,
        playlist,
    })
}

/// File name published for `artifact` under `mode`
fn published_name(artifact: &IndirectionArtifact, mode: OutputMode) -> String {
    match mode {
        OutputMode::Indirect => artifact.name.clone(),
        OutputMode::Mirror => {
            let extension = source_extension(&artifact.origin_url)
                .unwrap_or_else(|| FALLBACK_SEGMENT_EXTENSION.to_string());
            format!("{}.{}", artifact.stem(), extension)
        }
    }
}

/// Drives one rewrite against a fetcher and a store
pub struct RewriteBatch {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ArtifactStore>,
    options: RewriteOptions,
}

impl RewriteBatch {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn ArtifactStore>,
        options: RewriteOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            options,
        }
    }

    pub fn options(&self) -> &RewriteOptions {
        &self.options
    }

    /// Run the whole pipeline for `source_url`.
    pub async fn run(&self, source_url: &str) -> Result<RewriteSummary> {
        info!("Rewriting playlist {}", redact_url(source_url));

        let content = self.fetch_playlist(source_url).await?;
        let plan = plan_rewrite(&content, source_url, &self.options)?;

        info!(
            "Selected {} of {} segments",
            plan.artifacts.len(),
            plan.segments_total()
        );

        match self.options.mode {
            OutputMode::Indirect => self.store_artifacts(&plan).await?,
            OutputMode::Mirror => self.mirror_segments(&plan).await?,
        }

        self.store
            .put(&self.options.playlist_name, plan.playlist.as_bytes())
            .await?;

        info!(
            "Wrote {} with {} segment references",
            self.options.playlist_name,
            plan.files.len()
        );

        Ok(RewriteSummary {
            source_url: source_url.to_string(),
            segments_total: plan.segments_total(),
            segments_selected: plan.artifacts.len(),
            files: plan.files,
            playlist_path: self.options.playlist_name.clone(),
        })
    }

    async fn fetch_playlist(&self, source_url: &str) -> Result<String> {
        let response = self.fetcher.fetch(source_url).await.map_err(|e| match e {
            ShimError::Transport { url, reason } => ShimError::PlaylistFetch {
                url,
                status: None,
                reason,
            },
            other => other,
        })?;

        if !response.is_success() {
            return Err(ShimError::PlaylistFetch {
                url: source_url.to_string(),
                status: Some(response.status),
                reason: format!("HTTP {}", response.status),
            });
        }

        Ok(response.text())
    }

    async fn store_artifacts(&self, plan: &RewritePlan) -> Result<()> {
        for (artifact, path) in plan.artifacts.artifacts.iter().zip(&plan.files) {
            self.store
                .put(path, artifact.encoded_payload.as_bytes())
                .await?;
        }
        Ok(())
    }

    /// Fetch selected segments through a bounded pool and store them in
    /// playlist order.
    async fn mirror_segments(&self, plan: &RewritePlan) -> Result<()> {
        let concurrency = self.options.prefetch_concurrency.max(1);
        let fetcher = &self.fetcher;

        let mut downloads = stream::iter(plan.artifacts.artifacts.iter().zip(&plan.files))
            .map(|(artifact, path)| async move {
                let url = artifact.origin_url.as_str();
                debug!(ordinal = artifact.ordinal, url = %redact_url(url), "Mirroring segment");

                let response = fetcher.fetch(url).await?;
                if !response.is_success() {
                    return Err(ShimError::SegmentFetch {
                        url: url.to_string(),
                        status: response.status,
                    });
                }
                Ok::<_, ShimError>((path, response.body))
            })
            .buffered(concurrency);

        while let Some((path, body)) = downloads.try_next().await? {
            self.store.put(path, &body).await?;
        }
        Ok(())
    }
}
