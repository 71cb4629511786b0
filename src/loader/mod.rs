//! Playback-side loaders.
//!
//! A [`Loader`] turns a URL requested by a player into the bytes the player
//! should receive. [`HttpLoader`] is the default path; [`IndirectionLoader`]
//! wraps any loader and resolves indirection artifacts in front of it.

pub mod direct;
pub mod indirect;
pub mod origin_policy;

pub use direct::HttpLoader;
pub use indirect::{ArtifactMatcher, IndirectionLoader};
pub use origin_policy::OriginPolicy;

use crate::error::{Result, ShimError};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// A load issued by the host player
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub url: String,
    /// Cancelled by the host on teardown or quality switch
    pub cancel: CancellationToken,
}

impl LoadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(url: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            url: url.into(),
            cancel,
        }
    }

    /// Run `fut` unless the request is cancelled first.
    pub(crate) async fn race<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled()),
            result = fut => result,
        }
    }

    pub(crate) fn cancelled(&self) -> ShimError {
        ShimError::Cancelled {
            url: self.url.clone(),
        }
    }
}

/// Bytes handed back to the player for one load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSegment {
    /// URL the player asked for
    pub requested_url: String,
    /// Origin URL recovered from an artifact, `None` for direct loads
    pub origin_url: Option<String>,
    /// Raw payload, unmodified
    pub payload: Bytes,
    /// Content type reported by the final hop
    pub content_type: Option<String>,
}

impl ResolvedSegment {
    pub fn is_indirected(&self) -> bool {
        self.origin_url.is_some()
    }

    /// URL the payload actually came from
    pub fn source_url(&self) -> &str {
        self.origin_url.as_deref().unwrap_or(&self.requested_url)
    }
}

/// Loader capability the host player is configured with
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, request: LoadRequest) -> Result<ResolvedSegment>;
}
