//! `fc-demux` — Custom ISO-BMFF (MP4/MOV) container parser.
//!
//! Recovers the video elementary stream and its random-access metadata:
//! box tree, flat sample table, and out-of-band parameter sets.
//! No FFmpeg dependency — fully custom parser.

pub mod mp4;
pub mod traits;

pub use mp4::Mp4Source;
pub use traits::{MediaSource, SourceInfo};
