//! Rewrite HLS media playlists so segments are reached through small
//! indirection artifacts, and resolve those artifacts back to the origin
//! segment at playback time.
//!
//! The rewrite side is [`batch::RewriteBatch`]; the playback side is
//! [`loader::IndirectionLoader`], exposed over HTTP by [`server`].

pub mod artifact;
pub mod batch;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hls;
pub mod loader;
pub mod metrics;
pub mod server;
