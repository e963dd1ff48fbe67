//! `fc-player` — Look-ahead hardware decode scheduling.
//!
//! Pulls samples from an [`fc_demux::MediaSource`], submits them to an
//! external codec engine, and collects decoded frames into a small,
//! strictly-ordered buffer a renderer consumes one frame at a time.
//!
//! # Architecture
//!
//! A dedicated worker thread owns the media source and the engine instances
//! and serializes every decode; the renderer-facing [`Player`] handle only
//! touches the shared frame buffer and cursor under one lock. Seek blocks the
//! caller on a condvar the worker signals after each completion, bounded by
//! the configured timeout.
//!
//! ## Module overview
//!
//! - [`engine`] — the codec engine seam (`DecodeEngine` trait)
//! - [`buffer`] — pts-ordered, capacity-bounded frame buffer
//! - [`cursor`] — sequential-decode gate
//! - [`scheduler`] — the worker loop (decode, session recovery, seek replay)
//! - [`player`] — the consumer-facing handle

pub mod buffer;
pub mod cursor;
pub mod engine;
pub mod player;
pub mod scheduler;

pub use buffer::{DecodedFrame, FrameBuffer};
pub use cursor::DecodeCursor;
pub use engine::{DecodeEngine, DecodeRequest, DecodedImage, EngineContext};
pub use player::{Player, PlayerEvent};

#[cfg(test)]
pub(crate) mod testsupport;
