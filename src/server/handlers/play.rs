use crate::{
    error::Result,
    fetch::redact_url,
    loader::LoadRequest,
    metrics,
    server::state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

/// Resolve a distribution path through the configured loader.
///
/// Artifact paths come back as the origin segment bytes; anything else is
/// relayed as-is. The load is cancelled if the client goes away.
pub async fn play(
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    State(state): State<AppState>,
) -> Result<Response> {
    let start = Instant::now();
    let url = state.play_url(&path, query.as_deref())?;
    info!("Play request: {}", redact_url(&url));

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match state.loader.load(LoadRequest::with_cancel(url, cancel)).await {
        Ok(resolved) => {
            let content_type = content_type_for(resolved.source_url())
                .map(str::to_string)
                .or(resolved.content_type.clone())
                .unwrap_or_else(|| "application/octet-stream".to_string());

            metrics::record_load(resolved.is_indirected());
            metrics::record_request("play", 200);
            metrics::record_duration("play", start);

            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type)],
                Body::from(resolved.payload),
            )
                .into_response())
        }
        Err(e) => {
            metrics::record_load_error(e.kind());
            metrics::record_request("play", e.status_code().as_u16());
            metrics::record_duration("play", start);
            Err(e)
        }
    }
}

/// Media content type from the URL path's extension
pub fn content_type_for(url: &str) -> Option<&'static str> {
    let parsed = Url::parse(url).ok()?;
    let file_name = parsed.path_segments()?.next_back()?;
    let (_, extension) = file_name.rsplit_once('.')?;

    let content_type = match extension.to_ascii_lowercase().as_str() {
        "m3u8" => "application/vnd.apple.mpegurl",
        "ts" => "video/MP2T",
        "m4s" | "mp4" => "video/mp4",
        "aac" => "audio/aac",
        "js" => "application/javascript",
        _ => return None,
    };
    Some(content_type)
}
