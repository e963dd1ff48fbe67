//! Central error types for the playback engine (thiserror-based).

use thiserror::Error;

use crate::codec::VideoCodec;

/// Container parsing errors. Fatal at open time.
#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("Invalid box at offset {offset}: {reason}")]
    InvalidStructure { offset: u64, reason: String },

    #[error("Required box missing: {name}")]
    RequiredBoxMissing { name: &'static str },

    #[error("No video track found")]
    NoVideoTrack,

    #[error("Unsupported sample entry: {0}")]
    UnsupportedSampleEntry(String),

    #[error("Truncated data: expected {expected} bytes, got {got}")]
    TruncatedData { expected: usize, got: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode engine errors. `InvalidSession` is recoverable via session reset.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Engine init failed for {codec:?}: {reason}")]
    EngineInit { codec: VideoCodec, reason: String },

    #[error("Decode failed at frame {frame}: {reason}")]
    DecodeFailed { frame: u32, reason: String },

    #[error("Decoder session expired or invalid")]
    InvalidSession,

    #[error("Unsupported codec for decode: {0:?}")]
    UnsupportedCodec(VideoCodec),
}

/// Top-level player error.
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Demux error: {0}")]
    Demux(#[from] DemuxError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Seek to frame {target} timed out")]
    SeekTimeout { target: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Player is closed")]
    Closed,
}

/// Convenience Result type for player operations.
pub type PlayerResult<T> = Result<T, PlayerError>;
