pub mod parser;
pub mod rewriter;

pub use parser::{ParseOptions, PlaylistLine, ensure_media_playlist, parse_playlist, parse_playlist_with};
pub use rewriter::{TruncationPolicy, rewrite_playlist};
