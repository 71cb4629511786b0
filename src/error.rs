use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use crate::fetch::redact_url;
use thiserror::Error;
use tracing::error;

/// Errors raised by the rewrite pipeline and the playback loaders
#[derive(Debug, Error)]
pub enum ShimError {
    /// The playlist base URL is not a usable absolute URL
    #[error("invalid base URL `{}`: {reason}", redact_url(.url))]
    Parse { url: String, reason: String },

    /// The source playlist could not be fetched
    #[error("failed to fetch playlist {}: {reason}", redact_url(.url))]
    PlaylistFetch {
        url: String,
        status: Option<StatusCode>,
        reason: String,
    },

    /// The source is a master (multi-variant) playlist
    #[error("unsupported playlist: {0}")]
    UnsupportedPlaylist(String),

    /// An indirection artifact could not be fetched during playback
    #[error("failed to fetch artifact {}: {reason}", redact_url(.url))]
    ArtifactFetch {
        url: String,
        status: Option<StatusCode>,
        reason: String,
    },

    /// The artifact was fetched but carries no extractable origin URL
    #[error("malformed artifact at {}: {reason}", redact_url(.url))]
    MalformedArtifact { url: String, reason: String },

    /// The final hop (direct or origin) answered with a non-success status
    #[error("segment fetch for {} returned HTTP {status}", redact_url(.url))]
    SegmentFetch { url: String, status: StatusCode },

    /// Network-level failure before any status was received
    #[error("request to {} failed: {reason}", redact_url(.url))]
    Transport { url: String, reason: String },

    /// Origin URL rejected by the relay's origin policy
    #[error("origin not allowed: {}", redact_url(.0))]
    InvalidOrigin(String),

    #[error("load cancelled: {}", redact_url(.url))]
    Cancelled { url: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ShimError {
    /// Stable label used in log fields, metric labels and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            ShimError::Parse { .. } => "parse",
            ShimError::PlaylistFetch { .. } => "playlist_fetch",
            ShimError::UnsupportedPlaylist(_) => "unsupported_playlist",
            ShimError::ArtifactFetch { .. } => "artifact_fetch",
            ShimError::MalformedArtifact { .. } => "malformed_artifact",
            ShimError::SegmentFetch { .. } => "segment_fetch",
            ShimError::Transport { .. } => "transport",
            ShimError::InvalidOrigin(_) => "invalid_origin",
            ShimError::Cancelled { .. } => "cancelled",
            ShimError::Io(_) => "io",
            ShimError::Config(_) => "config",
        }
    }

    /// HTTP status the playback relay answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ShimError::SegmentFetch { status, .. }
                if status.is_client_error() || status.is_server_error() =>
            {
                *status
            }
            ShimError::SegmentFetch { .. }
            | ShimError::ArtifactFetch { .. }
            | ShimError::MalformedArtifact { .. }
            | ShimError::Transport { .. }
            | ShimError::PlaylistFetch { .. } => StatusCode::BAD_GATEWAY,
            ShimError::InvalidOrigin(_) => StatusCode::FORBIDDEN,
            ShimError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ShimError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        error!(kind = self.kind(), status = %status, "{}", self);
        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ShimError>;
