use crate::artifact::{ArtifactLayout, ArtifactNaming};
use crate::batch::{
    DEFAULT_ARTIFACT_DIR, DEFAULT_MAX_SEGMENTS, DEFAULT_PLAYLIST_NAME, OutputMode, RewriteOptions,
};
use crate::error::{Result, ShimError};
use crate::fetch::{DEFAULT_USER_AGENT, FetchConfig};
use crate::hls::{ParseOptions, TruncationPolicy};
use crate::loader::OriginPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use url::Url;

const DEV_PORT: u16 = 3000;
const DEV_DISTRIBUTION_URL: &str = "http://localhost:8000/";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub is_dev: bool,
    /// Source media playlist, required by `rewrite`
    pub source_url: Option<String>,
    pub output_dir: PathBuf,
    pub playlist_name: String,
    /// Artifact subdirectory under `output_dir`
    pub artifact_dir: String,
    /// Maximum segments kept in the output playlist (at least 1)
    pub max_segments: usize,
    pub naming: ArtifactNaming,
    pub truncation: TruncationPolicy,
    /// Append the source playlist's query string to relative segment URLs
    pub inherit_query: bool,
    pub output_mode: OutputMode,
    /// Concurrent segment fetches in mirror mode
    pub prefetch_concurrency: usize,
    pub user_agent: String,
    pub fetch_timeout: Option<Duration>,
    /// Relay port, required by `serve` outside dev mode
    pub port: Option<u16>,
    /// Static distribution point the relay resolves `/play` paths against
    pub distribution_url: Option<String>,
    /// Refuse origin URLs on private or loopback addresses
    pub block_private_origins: bool,
}

/// Command-line values that replace their environment variables.
///
/// A replaced variable is not parsed, so an invalid value in the
/// environment does not fail a run that overrides it.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub source_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub max_segments: Option<usize>,
    pub port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables.
    /// In DEV mode the relay settings get local defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(Overrides::default())
    }

    /// Like [`Config::from_env`], with `overrides` taking precedence.
    pub fn from_env_with(overrides: Overrides) -> Result<Self> {
        let is_dev = env_flag("DEV_MODE", false);

        let port = match (overrides.port, env::var("PORT")) {
            (Some(port), _) => Some(port),
            (None, Ok(raw)) => Some(
                raw.parse::<u16>()
                    .map_err(|_| ShimError::Config(format!("PORT is not a valid port: {raw}")))?,
            ),
            (None, Err(_)) if is_dev => Some(DEV_PORT),
            (None, Err(_)) => None,
        };

        let distribution_url = env::var("DISTRIBUTION_URL")
            .ok()
            .or_else(|| is_dev.then(|| DEV_DISTRIBUTION_URL.to_string()));

        let max_segments = match (overrides.max_segments, env::var("MAX_SEGMENTS")) {
            (Some(limit), _) => limit,
            (None, Ok(raw)) => parse_max_segments(&raw)?,
            (None, Err(_)) => DEFAULT_MAX_SEGMENTS,
        };

        let naming = match env_lower("ARTIFACT_NAMING", "position").as_str() {
            "source" | "source-name" => ArtifactNaming::SourceName,
            "position" => ArtifactNaming::Position,
            other => {
                warn!("Unknown ARTIFACT_NAMING '{}', using position", other);
                ArtifactNaming::Position
            }
        };

        let truncation = match env_lower("TRUNCATION", "drop-paired").as_str() {
            "keep-directives" | "keep" => TruncationPolicy::KeepDirectives,
            "drop-paired" | "drop" => TruncationPolicy::DropPaired,
            other => {
                warn!("Unknown TRUNCATION '{}', using drop-paired", other);
                TruncationPolicy::DropPaired
            }
        };

        let output_mode = match env_lower("OUTPUT_MODE", "indirect").as_str() {
            "mirror" => OutputMode::Mirror,
            "indirect" => OutputMode::Indirect,
            other => {
                warn!("Unknown OUTPUT_MODE '{}', using indirect", other);
                OutputMode::Indirect
            }
        };

        let prefetch_concurrency = match env::var("PREFETCH_CONCURRENCY") {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!("Invalid PREFETCH_CONCURRENCY '{}', using 1", raw);
                    1
                }
            },
            Err(_) => 1,
        };

        let fetch_timeout = match env::var("FETCH_TIMEOUT_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    warn!("Invalid FETCH_TIMEOUT_SECS '{}', using no timeout", raw);
                    None
                }
            },
            Err(_) => None,
        };

        Ok(Config {
            is_dev,
            source_url: overrides
                .source_url
                .or_else(|| env::var("SOURCE_URL").ok()),
            output_dir: overrides.output_dir.unwrap_or_else(|| {
                env::var("OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("video"))
            }),
            playlist_name: env::var("PLAYLIST_NAME")
                .unwrap_or_else(|_| DEFAULT_PLAYLIST_NAME.to_string()),
            artifact_dir: env::var("ARTIFACT_DIR")
                .unwrap_or_else(|_| DEFAULT_ARTIFACT_DIR.to_string()),
            max_segments,
            naming,
            truncation,
            inherit_query: env_flag("INHERIT_QUERY", false),
            output_mode,
            prefetch_concurrency,
            user_agent: env::var("USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            fetch_timeout,
            port,
            distribution_url,
            block_private_origins: env_flag("BLOCK_PRIVATE_ORIGINS", false),
        })
    }

    pub fn require_source_url(&self) -> Result<&str> {
        self.source_url
            .as_deref()
            .ok_or_else(|| ShimError::Config("SOURCE_URL is required".to_string()))
    }

    pub fn require_port(&self) -> Result<u16> {
        self.port
            .ok_or_else(|| ShimError::Config("PORT is required in production".to_string()))
    }

    /// Distribution URL as a join base (always ends in `/`).
    pub fn distribution_base(&self) -> Result<Url> {
        let raw = self.distribution_url.as_deref().ok_or_else(|| {
            ShimError::Config("DISTRIBUTION_URL is required in production".to_string())
        })?;

        let with_slash = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };

        let url = Url::parse(&with_slash)
            .map_err(|e| ShimError::Config(format!("invalid DISTRIBUTION_URL {raw}: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ShimError::Config(format!(
                "DISTRIBUTION_URL must be http(s), got {scheme}"
            ))),
        }
    }

    pub fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            limit: self.max_segments,
            layout: ArtifactLayout::new(self.artifact_dir.clone()),
            naming: self.naming,
            truncation: self.truncation,
            parse: ParseOptions {
                inherit_query: self.inherit_query,
            },
            mode: self.output_mode,
            prefetch_concurrency: self.prefetch_concurrency,
            playlist_name: self.playlist_name.clone(),
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            timeout: self.fetch_timeout,
        }
    }

    pub fn origin_policy(&self) -> OriginPolicy {
        OriginPolicy {
            block_private: self.block_private_origins,
        }
    }
}

/// Parse a segment limit, rejecting zero and non-numbers.
pub fn parse_max_segments(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ShimError::Config(
            "MAX_SEGMENTS must be at least 1".to_string(),
        )),
        Ok(n) => Ok(n),
        Err(_) => Err(ShimError::Config(format!(
            "MAX_SEGMENTS is not a positive integer: {raw}"
        ))),
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_lower(name: &str, default: &str) -> String {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .to_lowercase()
}
