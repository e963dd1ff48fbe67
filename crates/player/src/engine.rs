//! The codec engine seam.
//!
//! The actual hardware decoder lives outside this crate; the scheduler only
//! sees this trait. Implementations are chosen at open time by codec through
//! the factory the embedder supplies, so there is no runtime capability
//! negotiation on the decode path.

use fc_common::{DecodeError, Resolution, VideoCodec};
use fc_demux::mp4::ParameterSets;

/// One access unit submitted for decode.
#[derive(Debug)]
pub struct DecodeRequest<'a> {
    pub frame_index: u32,
    /// Raw sample bytes as stored in the container.
    pub data: &'a [u8],
    /// Presentation timestamp in media ticks.
    pub pts: u64,
    /// Decode-and-drop: the output is consumed for state only (seek replay).
    pub discard: bool,
}

/// Opaque decoded image handle. Released by the consumer, not by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedImage {
    /// Backend-specific handle (device pointer, surface id, ...).
    pub handle: u64,
    pub resolution: Resolution,
}

/// Everything an engine needs at construction.
#[derive(Debug, Clone)]
pub struct EngineContext<'a> {
    pub codec: VideoCodec,
    pub resolution: Resolution,
    pub parameter_sets: &'a ParameterSets,
    /// Which of the round-robined engine instances this is.
    pub worker_index: u32,
}

/// A decoder session for one codec.
///
/// `decode` is called from the scheduler's single worker thread, one request
/// at a time. Returning [`DecodeError::InvalidSession`] asks the scheduler to
/// `reset` the session and replay from the nearest sync sample.
pub trait DecodeEngine: Send {
    fn decode(&mut self, request: &DecodeRequest<'_>) -> Result<DecodedImage, DecodeError>;

    /// Tear down and recreate the underlying session.
    fn reset(&mut self) -> Result<(), DecodeError>;
}
