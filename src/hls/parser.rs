use crate::error::{Result, ShimError};
use crate::fetch::redact_url;
use m3u8_rs::{Playlist, parse_playlist_res};
use tracing::{debug, info, warn};
use url::Url;

/// One line of a media playlist, classified for rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistLine {
    /// Tag or comment line, passed through unchanged
    Directive { text: String },
    /// Empty or whitespace-only line, passed through unchanged
    Blank { text: String },
    /// Media segment reference
    SegmentRef {
        /// Line exactly as it appeared in the source
        original_text: String,
        /// Absolute URL of the segment bytes
        resolved_url: String,
    },
}

impl PlaylistLine {
    pub fn is_segment(&self) -> bool {
        matches!(self, PlaylistLine::SegmentRef { .. })
    }

    /// Resolved segment URL, or `None` for directive and blank lines
    pub fn resolved_url(&self) -> Option<&str> {
        match self {
            PlaylistLine::SegmentRef { resolved_url, .. } => Some(resolved_url),
            _ => None,
        }
    }
}

/// Options for [`parse_playlist_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Carry the playlist URL's query string (typically origin credentials)
    /// over to relative segment references.
    pub inherit_query: bool,
}

/// Parse playlist text fetched from `base_url` into classified lines.
///
/// Lines are split on `\n` and stored untrimmed, so joining the stored text
/// with `\n` reproduces the input byte for byte.
pub fn parse_playlist(content: &str, base_url: &str) -> Result<Vec<PlaylistLine>> {
    parse_playlist_with(content, base_url, ParseOptions::default())
}

/// Like [`parse_playlist`], with explicit [`ParseOptions`].
pub fn parse_playlist_with(
    content: &str,
    base_url: &str,
    options: ParseOptions,
) -> Result<Vec<PlaylistLine>> {
    let base = parse_base_url(base_url)?;

    let lines: Vec<PlaylistLine> = content
        .split('\n')
        .map(|raw| classify_line(raw, &base, options))
        .collect();

    let segments = lines.iter().filter(|l| l.is_segment()).count();
    info!(
        "Parsed playlist from {}: {} lines, {} segments",
        redact_url(base_url),
        lines.len(),
        segments
    );

    Ok(lines)
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let base = Url::parse(base_url).map_err(|e| ShimError::Parse {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;

    if base.cannot_be_a_base() {
        return Err(ShimError::Parse {
            url: base_url.to_string(),
            reason: "URL cannot be used as a base".to_string(),
        });
    }

    Ok(base)
}

fn classify_line(raw: &str, base: &Url, options: ParseOptions) -> PlaylistLine {
    // A leading byte order mark survives `trim()`
    let trimmed = raw.trim_start_matches('\u{feff}').trim();

    if trimmed.is_empty() {
        return PlaylistLine::Blank {
            text: raw.to_string(),
        };
    }

    if trimmed.starts_with('#') {
        return PlaylistLine::Directive {
            text: raw.to_string(),
        };
    }

    let resolved_url = resolve_segment_url(trimmed, base, options);
    debug!("Segment reference {} -> {}", trimmed, redact_url(&resolved_url));

    PlaylistLine::SegmentRef {
        original_text: raw.to_string(),
        resolved_url,
    }
}

/// Resolve a segment reference against the playlist URL.
///
/// References that already carry a scheme are returned unchanged.
pub fn resolve_segment_url(reference: &str, base: &Url, options: ParseOptions) -> String {
    if has_scheme(reference) {
        return reference.to_string();
    }

    match base.join(reference) {
        Ok(mut joined) => {
            if options.inherit_query {
                inherit_query(&mut joined, base);
            }
            joined.to_string()
        }
        Err(e) => {
            warn!(
                "Could not resolve segment reference {:?} against {}: {}",
                reference,
                redact_url(base.as_str()),
                e
            );
            reference.to_string()
        }
    }
}

fn inherit_query(segment: &mut Url, base: &Url) {
    let Some(base_query) = base.query().filter(|q| !q.is_empty()) else {
        return;
    };

    let merged = match segment.query().filter(|q| !q.is_empty()) {
        Some(own) => format!("{own}&{base_query}"),
        None => base_query.to_string(),
    };
    segment.set_query(Some(&merged));
}

/// RFC 3986 scheme check: `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"`
fn has_scheme(reference: &str) -> bool {
    let Some((scheme, _)) = reference.split_once(':') else {
        return false;
    };

    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// Reject master (multi-variant) playlists.
///
/// Only a positive master-playlist parse is rejected; content that m3u8-rs
/// cannot parse is left to the line parser.
pub fn ensure_media_playlist(content: &str) -> Result<()> {
    match parse_playlist_res(content.as_bytes()) {
        Ok(Playlist::MasterPlaylist(master)) => Err(ShimError::UnsupportedPlaylist(format!(
            "master playlist with {} variants; point SOURCE_URL at a single rendition",
            master.variants.len()
        ))),
        Ok(Playlist::MediaPlaylist(_)) => Ok(()),
        Err(e) => {
            debug!("m3u8-rs could not parse playlist, continuing: {:?}", e);
            Ok(())
        }
    }
}
