use crate::config::Config;
use crate::error::{Result, ShimError};
use crate::fetch::HttpFetcher;
use crate::loader::{HttpLoader, IndirectionLoader, Loader};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Loader every `/play` request goes through
    pub loader: Arc<dyn Loader>,
    /// Distribution point `/play` paths are resolved against
    pub distribution_base: Url,
    /// Prometheus handle, `None` when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    /// State around an explicit loader.
    pub fn new(config: Config, loader: Arc<dyn Loader>) -> Result<Self> {
        let distribution_base = config.distribution_base()?;

        Ok(Self {
            config: Arc::new(config),
            loader,
            distribution_base,
            metrics: None,
            started_at: Instant::now(),
        })
    }

    /// State with the default loader stack: an [`IndirectionLoader`] over an
    /// [`HttpLoader`], both sharing one connection pool.
    pub fn from_config(config: Config) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.fetch_config())?);
        let loader = IndirectionLoader::new(HttpLoader::new(fetcher.clone()), fetcher)
            .with_policy(config.origin_policy());

        Self::new(config, Arc::new(loader))
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// Absolute distribution URL for a `/play` path, query forwarded.
    ///
    /// The result must stay under the distribution base; `..` segments or
    /// absolute URLs that leave it are rejected.
    pub fn play_url(&self, path: &str, query: Option<&str>) -> Result<String> {
        let base = &self.distribution_base;
        let mut url = base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ShimError::InvalidOrigin(format!("{path}: {e}")))?;

        if url.origin() != base.origin() || !url.path().starts_with(base.path()) {
            return Err(ShimError::InvalidOrigin(format!(
                "{path} resolves outside the distribution point"
            )));
        }

        url.set_query(query.filter(|q| !q.is_empty()));
        Ok(url.into())
    }
}
