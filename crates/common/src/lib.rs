//! `fc-common` — Shared types, config, and errors for the FrameCast playback engine.
//!
//! Foundation crate for the demuxer and player crates:
//!
//! - **Types**: `TimeCode`, `Rational`, `Resolution` (newtypes for safety)
//! - **Codec**: `VideoCodec`, `TrackKind`
//! - **Config**: `PlayerConfig` (look-ahead depth, workers, seek bound)
//! - **Errors**: `DemuxError`, `DecodeError`, `PlayerError` (thiserror-based)

pub mod codec;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used items at crate root
pub use codec::{TrackKind, VideoCodec};
pub use config::PlayerConfig;
pub use error::{DecodeError, DemuxError, PlayerError, PlayerResult};
pub use types::{Rational, Resolution, TimeCode};
