//! The seam between the demuxer and the playback engine.

use fc_common::{DemuxError, Rational, Resolution, TimeCode, VideoCodec};

use crate::mp4::{ParameterSets, Sample};

/// Derived metadata exposed to the consumer at open.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub codec: VideoCodec,
    pub resolution: Resolution,
    pub fps: Rational,
    pub duration: TimeCode,
    pub sample_count: u32,
}

/// A demuxed video source the decode scheduler can pull samples from.
///
/// `read_sample` returning `Ok(None)` is the end-of-stream signal: the index
/// has no backing data (past the resolved table, or a byte range falling
/// outside the file).
pub trait MediaSource: Send {
    fn info(&self) -> &SourceInfo;

    fn sample_count(&self) -> u32;

    /// Resolved sample metadata, `None` past the end of the table.
    fn sample(&self, index: u32) -> Option<Sample>;

    /// Access unit bytes for a sample, `None` = no data (end of stream).
    fn read_sample(&mut self, index: u32) -> Result<Option<Vec<u8>>, DemuxError>;

    /// Random-access points, 0-based and sorted.
    fn sync_indices(&self) -> &[u32];

    fn parameter_sets(&self) -> &ParameterSets;
}
