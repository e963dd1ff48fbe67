//! Video codec and track type enums.

use serde::{Deserialize, Serialize};

/// Video codec identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    H265,
}

impl VideoCodec {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::H264 => "H.264/AVC",
            Self::H265 => "H.265/HEVC",
        }
    }

    /// Whether the codec carries a VPS in addition to SPS/PPS.
    pub fn has_vps(self) -> bool {
        matches!(self, Self::H265)
    }
}

/// Track type from the handler-reference atom.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
    Hint,
    Other,
}

impl TrackKind {
    /// Map a handler fourcc (`vide`, `soun`, `hint`) to a track kind.
    pub fn from_handler(handler: [u8; 4]) -> Self {
        match &handler {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"hint" => Self::Hint,
            _ => Self::Other,
        }
    }
}
