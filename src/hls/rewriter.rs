//! Structured playlist reconstruction.
//!
//! Rebuilds playlist text line by line from parsed [`PlaylistLine`]s.
//! Segment lines are replaced by their artifact reference when one exists
//! and dropped otherwise; everything else is emitted verbatim.

use crate::hls::parser::PlaylistLine;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// What happens to the tags attached to a segment that falls past the limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TruncationPolicy {
    /// Drop the media segment tags (`#EXTINF`, `#EXT-X-BYTERANGE`, ...)
    /// immediately preceding a dropped segment, so no orphaned `#EXTINF`
    /// is left behind.
    #[default]
    DropPaired,
    /// Keep every directive line, even those describing dropped segments.
    KeepDirectives,
}

/// Media segment tags (RFC 8216 section 4.3.2 plus GAP and BITRATE) that
/// describe the segment line that follows them.
const SEGMENT_TAGS: &[&str] = &[
    "#EXTINF",
    "#EXT-X-BYTERANGE",
    "#EXT-X-DISCONTINUITY",
    "#EXT-X-KEY",
    "#EXT-X-MAP",
    "#EXT-X-PROGRAM-DATE-TIME",
    "#EXT-X-DATERANGE",
    "#EXT-X-GAP",
    "#EXT-X-BITRATE",
];

/// Returns `true` if the directive is a media segment tag.
pub fn is_segment_tag(directive: &str) -> bool {
    let trimmed = directive.trim();
    let name = trimmed.split(':').next().unwrap_or(trimmed);
    SEGMENT_TAGS.contains(&name)
}

/// Rebuild playlist text.
///
/// `references` maps the index of a `SegmentRef` line in `lines` to the text
/// that replaces it. Segment lines without an entry are omitted.
pub fn rewrite_playlist(
    lines: &[PlaylistLine],
    references: &BTreeMap<usize, String>,
    policy: TruncationPolicy,
) -> String {
    let orphaned = match policy {
        TruncationPolicy::DropPaired => orphaned_segment_tags(lines, references),
        TruncationPolicy::KeepDirectives => HashSet::new(),
    };

    let mut output: Vec<Cow<'_, str>> = Vec::with_capacity(lines.len());

    for (index, line) in lines.iter().enumerate() {
        match line {
            PlaylistLine::Directive { text } => {
                if orphaned.contains(&index) {
                    debug!("Dropping tag of truncated segment: {}", text.trim_end());
                    continue;
                }
                output.push(Cow::Borrowed(text.as_str()));
            }
            PlaylistLine::Blank { text } => output.push(Cow::Borrowed(text.as_str())),
            PlaylistLine::SegmentRef { original_text, .. } => {
                let Some(reference) = references.get(&index) else {
                    continue;
                };
                // Keep CRLF endings consistent with the source line
                if original_text.ends_with('\r') {
                    output.push(Cow::Owned(format!("{reference}\r")));
                } else {
                    output.push(Cow::Borrowed(reference.as_str()));
                }
            }
        }
    }

    output.join("\n")
}

/// Indices of segment tags that belong to segments with no reference.
///
/// Walks backwards from each dropped segment over the directive/blank run
/// that precedes it, stopping at the previous segment line.
fn orphaned_segment_tags(
    lines: &[PlaylistLine],
    references: &BTreeMap<usize, String>,
) -> HashSet<usize> {
    let mut orphaned = HashSet::new();

    for (index, line) in lines.iter().enumerate() {
        if !line.is_segment() || references.contains_key(&index) {
            continue;
        }

        for prev in (0..index).rev() {
            match &lines[prev] {
                PlaylistLine::SegmentRef { .. } => break,
                PlaylistLine::Directive { text } if is_segment_tag(text) => {
                    orphaned.insert(prev);
                }
                _ => {}
            }
        }
    }

    orphaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::parser::parse_playlist;

    const BASE: &str = "http://h/p/index.m3u8";

    fn refs(pairs: &[(usize, &str)]) -> BTreeMap<usize, String> {
        pairs.iter().map(|(i, r)| (*i, r.to_string())).collect()
    }

    #[test]
    fn keep_directives_reproduces_orphaned_extinf() {
        let source = "#EXTM3U\n#EXTINF:4,\nseg0.ts\n#EXTINF:4,\nseg1.ts\n";
        let lines = parse_playlist(source, BASE).unwrap();

        let out = rewrite_playlist(
            &lines,
            &refs(&[(2, "segments/segment_0.js")]),
            TruncationPolicy::KeepDirectives,
        );
        assert_eq!(out, "#EXTM3U\n#EXTINF:4,\nsegments/segment_0.js\n#EXTINF:4,\n");
    }

    #[test]
    fn drop_paired_removes_orphaned_extinf() {
        let source = "#EXTM3U\n#EXTINF:4,\nseg0.ts\n#EXTINF:4,\nseg1.ts\n";
        let lines = parse_playlist(source, BASE).unwrap();

        let out = rewrite_playlist(
            &lines,
            &refs(&[(2, "segments/segment_0.js")]),
            TruncationPolicy::DropPaired,
        );
        assert_eq!(out, "#EXTM3U\n#EXTINF:4,\nsegments/segment_0.js\n");
    }

    #[test]
    fn drop_paired_keeps_header_and_trailing_tags() {
        let source = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n\
                      #EXTINF:4,\nseg0.ts\n# operator note\n#EXT-X-DISCONTINUITY\n\
                      #EXTINF:4,\nseg1.ts\n#EXT-X-ENDLIST\n";
        let lines = parse_playlist(source, BASE).unwrap();

        let out = rewrite_playlist(&lines, &BTreeMap::new(), TruncationPolicy::DropPaired);
        assert_eq!(
            out,
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n# operator note\n#EXT-X-ENDLIST\n"
        );
    }

    #[test]
    fn directives_and_blanks_pass_through_verbatim() {
        let source = "#EXTM3U\n\n#EXT-X-CUSTOM:A=\"b c\"  \n#EXTINF:4.000,title\nseg0.ts\n";
        let lines = parse_playlist(source, BASE).unwrap();

        let out = rewrite_playlist(
            &lines,
            &refs(&[(4, "segments/segment_0.js")]),
            TruncationPolicy::DropPaired,
        );
        assert_eq!(
            out,
            "#EXTM3U\n\n#EXT-X-CUSTOM:A=\"b c\"  \n#EXTINF:4.000,title\nsegments/segment_0.js\n"
        );
    }

    #[test]
    fn crlf_segment_lines_keep_their_ending() {
        let lines = parse_playlist("#EXTM3U\r\n#EXTINF:4,\r\nseg0.ts\r\n", BASE).unwrap();
        let out = rewrite_playlist(
            &lines,
            &refs(&[(2, "segments/segment_0.js")]),
            TruncationPolicy::DropPaired,
        );
        assert_eq!(out, "#EXTM3U\r\n#EXTINF:4,\r\nsegments/segment_0.js\r\n");
    }

    #[test]
    fn substring_names_are_not_double_replaced() {
        // seg1.ts is a substring of seg11.ts
        let source = "#EXTINF:4,\nseg1.ts\n#EXTINF:4,\nseg11.ts\n";
        let lines = parse_playlist(source, BASE).unwrap();

        let out = rewrite_playlist(
            &lines,
            &refs(&[(1, "segments/seg1.js"), (3, "segments/seg11.js")]),
            TruncationPolicy::DropPaired,
        );
        assert_eq!(out, "#EXTINF:4,\nsegments/seg1.js\n#EXTINF:4,\nsegments/seg11.js\n");
    }

    #[test]
    fn segment_tag_detection() {
        assert!(is_segment_tag("#EXTINF:4,"));
        assert!(is_segment_tag("#EXT-X-DISCONTINUITY"));
        assert!(is_segment_tag("#EXT-X-KEY:METHOD=AES-128,URI=\"k\""));
        assert!(!is_segment_tag("#EXTM3U"));
        assert!(!is_segment_tag("#EXT-X-ENDLIST"));
        assert!(!is_segment_tag("#EXT-X-TARGETDURATION:4"));
        assert!(!is_segment_tag("# EXTINF in a comment"));
    }
}
