use crate::error::{Result, ShimError};
use crate::fetch::{Fetcher, redact_url};
use crate::loader::{LoadRequest, Loader, ResolvedSegment};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Default loader: one fetch, success statuses only
#[derive(Clone)]
pub struct HttpLoader {
    fetcher: Arc<dyn Fetcher>,
}

impl HttpLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Loader for HttpLoader {
    async fn load(&self, request: LoadRequest) -> Result<ResolvedSegment> {
        debug!("Direct load: {}", redact_url(&request.url));

        let response = request.race(self.fetcher.fetch(&request.url)).await?;
        if !response.is_success() {
            return Err(ShimError::SegmentFetch {
                url: request.url,
                status: response.status,
            });
        }

        Ok(ResolvedSegment {
            requested_url: request.url,
            origin_url: None,
            payload: response.body,
            content_type: response.content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::test_support::StubFetcher;
    use reqwest::StatusCode;

    #[tokio::test]
    async fn returns_payload_on_success() {
        let stub = Arc::new(StubFetcher::new().with("http://cdn/playlist.m3u8", 200, "#EXTM3U\n"));
        let loader = HttpLoader::new(stub.clone());

        let resolved = loader
            .load(LoadRequest::new("http://cdn/playlist.m3u8"))
            .await
            .unwrap();

        assert_eq!(resolved.payload.as_ref(), b"#EXTM3U\n");
        assert!(!resolved.is_indirected());
        assert_eq!(stub.calls(), vec!["http://cdn/playlist.m3u8"]);
    }

    #[tokio::test]
    async fn non_success_is_segment_fetch_error() {
        let stub = Arc::new(StubFetcher::new().with("http://cdn/seg0.ts", 403, ""));
        let loader = HttpLoader::new(stub);

        let err = loader
            .load(LoadRequest::new("http://cdn/seg0.ts"))
            .await
            .unwrap_err();

        match err {
            ShimError::SegmentFetch { status, .. } => assert_eq!(status, StatusCode::FORBIDDEN),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_request_does_not_fetch() {
        let stub = Arc::new(StubFetcher::new().with("http://cdn/seg0.ts", 200, "x"));
        let loader = HttpLoader::new(stub.clone());

        let request = LoadRequest::new("http://cdn/seg0.ts");
        request.cancel.cancel();

        let err = loader.load(request).await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");
        assert!(stub.calls().is_empty());
    }
}
