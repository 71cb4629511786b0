use crate::artifact::codec::extract_origin_url;
use crate::artifact::generator::ARTIFACT_EXTENSION;
use crate::error::{Result, ShimError};
use crate::fetch::{Fetcher, redact_url};
use crate::loader::origin_policy::OriginPolicy;
use crate::loader::{LoadRequest, Loader, ResolvedSegment};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Player bootstrap scripts served next to artifacts that must load as-is
pub const DEFAULT_EXCLUDED_SCRIPTS: &[&str] = &["hls.min.js", "hls.js"];

/// Decides whether a requested URL is an indirection artifact
#[derive(Debug, Clone)]
pub struct ArtifactMatcher {
    extension: String,
    excluded: Vec<String>,
}

impl Default for ArtifactMatcher {
    fn default() -> Self {
        Self {
            extension: ARTIFACT_EXTENSION.to_string(),
            excluded: DEFAULT_EXCLUDED_SCRIPTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ArtifactMatcher {
    /// Add a file name that must never be treated as an artifact.
    pub fn exclude(mut self, file_name: impl Into<String>) -> Self {
        self.excluded.push(file_name.into());
        self
    }

    /// True when the final path segment ends in the artifact extension and
    /// is not an excluded bootstrap resource. Query and fragment are ignored.
    pub fn matches(&self, url: &str) -> bool {
        let Some(file_name) = final_path_segment(url) else {
            return false;
        };

        let suffix = format!(".{}", self.extension);
        file_name.len() > suffix.len()
            && file_name.ends_with(&suffix)
            && !self.excluded.iter().any(|e| e == &file_name)
    }
}

fn final_path_segment(url: &str) -> Option<String> {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        // Relative URLs from hosts that never resolved them
        Err(_) => {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            path.rsplit('/').next().map(str::to_string)
        }
    }
}

/// Loader decorator that follows indirection artifacts to their origin.
///
/// Artifact URLs take two hops: the artifact itself, then the origin URL it
/// names. Everything else is handed to the wrapped loader untouched. The
/// decorator holds no mutable state, so one instance serves any number of
/// concurrent loads.
pub struct IndirectionLoader<L> {
    inner: L,
    fetcher: Arc<dyn Fetcher>,
    matcher: ArtifactMatcher,
    policy: OriginPolicy,
}

impl<L: Loader> IndirectionLoader<L> {
    pub fn new(inner: L, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            inner,
            fetcher,
            matcher: ArtifactMatcher::default(),
            policy: OriginPolicy::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: ArtifactMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_policy(mut self, policy: OriginPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn load_indirected(&self, request: LoadRequest) -> Result<ResolvedSegment> {
        let artifact_url = request.url.as_str();

        let artifact = request
            .race(self.fetcher.fetch(artifact_url))
            .await
            .map_err(|e| match e {
                ShimError::Transport { reason, .. } => ShimError::ArtifactFetch {
                    url: artifact_url.to_string(),
                    status: None,
                    reason,
                },
                other => other,
            })?;

        if !artifact.is_success() {
            return Err(ShimError::ArtifactFetch {
                url: artifact_url.to_string(),
                status: Some(artifact.status),
                reason: format!("HTTP {}", artifact.status),
            });
        }

        let body = artifact.text();
        let origin_url = extract_origin_url(&body)
            .ok_or_else(|| ShimError::MalformedArtifact {
                url: artifact_url.to_string(),
                reason: "expected exactly one segmentUrl assignment".to_string(),
            })?
            .to_string();

        self.policy
            .check(&origin_url)
            .map_err(|rejection| rejection.into_error(artifact_url, &origin_url))?;

        if request.cancel.is_cancelled() {
            return Err(request.cancelled());
        }

        debug!(
            "Artifact {} -> origin {}",
            redact_url(artifact_url),
            redact_url(&origin_url)
        );

        let segment = request.race(self.fetcher.fetch(&origin_url)).await?;
        if !segment.is_success() {
            return Err(ShimError::SegmentFetch {
                url: origin_url,
                status: segment.status,
            });
        }

        Ok(ResolvedSegment {
            requested_url: request.url,
            origin_url: Some(origin_url),
            payload: segment.body,
            content_type: segment.content_type,
        })
    }
}

#[async_trait]
impl<L: Loader> Loader for IndirectionLoader<L> {
    async fn load(&self, request: LoadRequest) -> Result<ResolvedSegment> {
        if !self.matcher.matches(&request.url) {
            return self.inner.load(request).await;
        }

        let url = request.url.clone();
        let result = self.load_indirected(request).await;
        if let Err(e) = &result {
            warn!(kind = e.kind(), url = %redact_url(&url), "Indirected load failed: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::codec::encode_artifact;
    use crate::fetch::FetchResponse;
    use crate::loader::HttpLoader;
    use crate::loader::test_support::StubFetcher;
    use bytes::Bytes;
    use reqwest::StatusCode;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const ARTIFACT: &str = "http://cdn/segments/segment_0.js";
    const ORIGIN: &str = "http://h/p/seg0.ts";

    fn loader_over(stub: Arc<StubFetcher>) -> IndirectionLoader<HttpLoader> {
        IndirectionLoader::new(HttpLoader::new(stub.clone()), stub)
    }

    #[test]
    fn matcher_accepts_artifacts_only() {
        let matcher = ArtifactMatcher::default();

        assert!(matcher.matches("http://cdn/segments/segment_0.js"));
        assert!(matcher.matches("http://cdn/segments/segment_0.js?v=2"));
        assert!(matcher.matches("segments/segment_0.js"));

        assert!(!matcher.matches("http://cdn/hls.min.js"));
        assert!(!matcher.matches("http://cdn/vendor/hls.js"));
        assert!(!matcher.matches("http://cdn/seg0.ts"));
        assert!(!matcher.matches("http://cdn/playlist.m3u8"));
        assert!(!matcher.matches("http://cdn/segments/"));
        assert!(!matcher.matches("http://cdn/seg.json"));
    }

    #[test]
    fn matcher_extra_exclusions() {
        let matcher = ArtifactMatcher::default().exclude("player.js");
        assert!(!matcher.matches("http://cdn/player.js"));
        assert!(matcher.matches("http://cdn/segment_1.js"));
    }

    #[tokio::test]
    async fn resolves_artifact_to_origin_payload() {
        let stub = Arc::new(
            StubFetcher::new()
                .with(ARTIFACT, 200, encode_artifact(ORIGIN))
                .with(ORIGIN, 200, Bytes::from_static(&[0x47, 0x40, 0x11])),
        );
        let loader = loader_over(stub.clone());

        let resolved = loader.load(LoadRequest::new(ARTIFACT)).await.unwrap();

        assert_eq!(resolved.payload.as_ref(), &[0x47, 0x40, 0x11]);
        assert_eq!(resolved.origin_url.as_deref(), Some(ORIGIN));
        assert_eq!(resolved.source_url(), ORIGIN);
        assert_eq!(stub.calls(), vec![ARTIFACT, ORIGIN]);
    }

    #[tokio::test]
    async fn artifact_without_assignment_is_malformed() {
        let stub = Arc::new(StubFetcher::new().with(ARTIFACT, 200, "console.log('hi');\n"));
        let loader = loader_over(stub.clone());

        let err = loader.load(LoadRequest::new(ARTIFACT)).await.unwrap_err();

        assert_eq!(err.kind(), "malformed_artifact");
        assert_eq!(stub.calls(), vec![ARTIFACT]);
    }

    #[tokio::test]
    async fn artifact_with_two_assignments_is_malformed() {
        let second = "window.segmentUrl = \"http://evil/2.ts\";\n";
        let body = format!("{}{second}", encode_artifact(ORIGIN));
        let stub = Arc::new(
            StubFetcher::new()
                .with(ARTIFACT, 200, body)
                .with(ORIGIN, 200, "payload"),
        );
        let loader = loader_over(stub.clone());

        let err = loader.load(LoadRequest::new(ARTIFACT)).await.unwrap_err();

        assert_eq!(err.kind(), "malformed_artifact");
        assert_eq!(stub.calls(), vec![ARTIFACT]);
    }

    #[tokio::test]
    async fn non_http_origin_is_malformed() {
        let stub = Arc::new(StubFetcher::new().with(
            ARTIFACT,
            200,
            "window.segmentUrl = \"file:///etc/passwd\";\n",
        ));
        let loader = loader_over(stub.clone());

        let err = loader.load(LoadRequest::new(ARTIFACT)).await.unwrap_err();

        assert_eq!(err.kind(), "malformed_artifact");
        assert_eq!(stub.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_artifact_is_artifact_fetch_error() {
        let stub = Arc::new(StubFetcher::new());
        let loader = loader_over(stub);

        let err = loader.load(LoadRequest::new(ARTIFACT)).await.unwrap_err();

        match err {
            ShimError::ArtifactFetch { status, .. } => {
                assert_eq!(status, Some(StatusCode::NOT_FOUND))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_artifact_is_artifact_fetch_error() {
        let stub = Arc::new(StubFetcher::new().unreachable(ARTIFACT));
        let loader = loader_over(stub);

        let err = loader.load(LoadRequest::new(ARTIFACT)).await.unwrap_err();

        match err {
            ShimError::ArtifactFetch { status, .. } => assert!(status.is_none()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn origin_failure_is_segment_fetch_error() {
        let stub = Arc::new(
            StubFetcher::new()
                .with(ARTIFACT, 200, encode_artifact(ORIGIN))
                .with(ORIGIN, 500, ""),
        );
        let loader = loader_over(stub);

        let err = loader.load(LoadRequest::new(ARTIFACT)).await.unwrap_err();

        match err {
            ShimError::SegmentFetch { url, status } => {
                assert_eq!(url, ORIGIN);
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_artifact_passes_through_with_one_fetch() {
        let stub = Arc::new(StubFetcher::new().with("http://cdn/playlist.m3u8", 200, "#EXTM3U\n"));
        let loader = loader_over(stub.clone());

        let resolved = loader
            .load(LoadRequest::new("http://cdn/playlist.m3u8"))
            .await
            .unwrap();

        assert!(!resolved.is_indirected());
        assert_eq!(resolved.payload.as_ref(), b"#EXTM3U\n");
        assert_eq!(stub.calls(), vec!["http://cdn/playlist.m3u8"]);
    }

    #[tokio::test]
    async fn bootstrap_script_is_not_treated_as_artifact() {
        let stub = Arc::new(StubFetcher::new().with("http://cdn/hls.min.js", 200, "/* hls */"));
        let loader = loader_over(stub.clone());

        let resolved = loader
            .load(LoadRequest::new("http://cdn/hls.min.js"))
            .await
            .unwrap();

        assert_eq!(resolved.payload.as_ref(), b"/* hls */");
        assert!(!resolved.is_indirected());
        assert_eq!(stub.calls().len(), 1);
    }

    #[tokio::test]
    async fn strict_policy_blocks_private_origins() {
        let private = "http://127.0.0.1:9000/seg0.ts";
        let stub = Arc::new(
            StubFetcher::new()
                .with(ARTIFACT, 200, encode_artifact(private))
                .with(private, 200, "secret"),
        );
        let loader = loader_over(stub.clone()).with_policy(OriginPolicy::strict());

        let err = loader.load(LoadRequest::new(ARTIFACT)).await.unwrap_err();

        assert_eq!(err.kind(), "invalid_origin");
        assert_eq!(stub.calls(), vec![ARTIFACT]);
    }

    /// Serves the artifact and cancels the load while doing so
    struct CancellingFetcher {
        inner: StubFetcher,
        token: CancellationToken,
    }

    #[async_trait]
    impl Fetcher for CancellingFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResponse> {
            let response = self.inner.fetch(url).await;
            self.token.cancel();
            response
        }
    }

    #[tokio::test]
    async fn cancellation_between_hops_skips_origin_fetch() {
        let token = CancellationToken::new();
        let fetcher = Arc::new(CancellingFetcher {
            inner: StubFetcher::new()
                .with(ARTIFACT, 200, encode_artifact(ORIGIN))
                .with(ORIGIN, 200, "payload"),
            token: token.clone(),
        });
        let stub_calls = fetcher.clone();
        let loader = IndirectionLoader::new(HttpLoader::new(fetcher.clone()), fetcher);

        let err = loader
            .load(LoadRequest::with_cancel(ARTIFACT, token))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "cancelled");
        assert_eq!(stub_calls.inner.calls(), vec![ARTIFACT]);
    }

    /// Never answers for `stalled`; everything else goes to the stub
    struct StallingFetcher {
        inner: StubFetcher,
        stalled: &'static str,
    }

    #[async_trait]
    impl Fetcher for StallingFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResponse> {
            if url == self.stalled {
                self.inner.record(url);
                return std::future::pending().await;
            }
            self.inner.fetch(url).await
        }
    }

    /// Start a load over `fetcher`, cancel it mid-flight, return its outcome.
    async fn cancel_in_flight(fetcher: Arc<StallingFetcher>) -> Result<ResolvedSegment> {
        let token = CancellationToken::new();
        let loader = IndirectionLoader::new(HttpLoader::new(fetcher.clone()), fetcher);

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(2),
            loader.load(LoadRequest::with_cancel(ARTIFACT, token)),
        )
        .await
        .expect("cancelled load should return promptly")
    }

    #[tokio::test]
    async fn cancellation_interrupts_artifact_fetch() {
        let fetcher = Arc::new(StallingFetcher {
            inner: StubFetcher::new().with(ORIGIN, 200, "payload"),
            stalled: ARTIFACT,
        });

        let err = cancel_in_flight(fetcher.clone()).await.unwrap_err();

        assert_eq!(err.kind(), "cancelled");
        assert_eq!(fetcher.inner.calls(), vec![ARTIFACT]);
    }

    #[tokio::test]
    async fn cancellation_interrupts_origin_fetch() {
        let fetcher = Arc::new(StallingFetcher {
            inner: StubFetcher::new().with(ARTIFACT, 200, encode_artifact(ORIGIN)),
            stalled: ORIGIN,
        });

        let err = cancel_in_flight(fetcher.clone()).await.unwrap_err();

        assert_eq!(err.kind(), "cancelled");
        assert_eq!(fetcher.inner.calls(), vec![ARTIFACT, ORIGIN]);
    }

    #[tokio::test]
    async fn concurrent_loads_are_independent() {
        let mut stub = StubFetcher::new();
        for i in 0..8 {
            let artifact = format!("http://cdn/segments/segment_{i}.js");
            let origin = format!("http://h/p/seg{i}.ts");
            stub = stub
                .with(&artifact, 200, encode_artifact(&origin))
                .with(&origin, 200, format!("payload-{i}"));
        }
        let loader = Arc::new(loader_over(Arc::new(stub)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let loader = loader.clone();
                tokio::spawn(async move {
                    loader
                        .load(LoadRequest::new(format!("http://cdn/segments/segment_{i}.js")))
                        .await
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let resolved = handle.await.unwrap().unwrap();
            assert_eq!(resolved.payload, Bytes::from(format!("payload-{i}")));
        }
    }
}
