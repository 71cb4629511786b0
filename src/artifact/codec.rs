//! Indirection artifact wire format.
//!
//! An artifact is a small script-shaped text file. Exactly one of its lines
//! assigns the origin URL to a global of the player bootstrap:
//!
//! ```text
//! window.segmentUrl = "https://origin.example.com/stream/seg0.ts";
//! ```
//!
//! The URL is written unescaped between literal double quotes, so the
//! producer must never emit a URL containing `"`.

use regex::Regex;
use std::sync::LazyLock;

/// Global object the assignment is made on
pub const BOOTSTRAP_GLOBAL: &str = "window";

static SEGMENT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.segmentUrl = "([^"]+)""#).expect("valid segmentUrl regex")
});

/// Render the artifact body for `origin_url`.
pub fn encode_artifact(origin_url: &str) -> String {
    format!(
        "// HLS segment indirection\n\
         // Original URL: {origin_url}\n\
         {BOOTSTRAP_GLOBAL}.segmentUrl = \"{origin_url}\";\n"
    )
}

/// Extract the origin URL from an artifact body.
///
/// Returns `None` unless exactly one assignment is present.
pub fn extract_origin_url(body: &str) -> Option<&str> {
    let mut matches = SEGMENT_URL_RE.captures_iter(body);
    let caps = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    caps.get(1).map(|m| m.as_str())
}
