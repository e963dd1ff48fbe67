//! Shared fakes for scheduler and player tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fc_common::{DecodeError, DemuxError, Rational, Resolution, TimeCode, VideoCodec};
use fc_demux::mp4::{ParameterSets, Sample};
use fc_demux::{MediaSource, SourceInfo};
use parking_lot::Mutex;

use crate::engine::{DecodeEngine, DecodeRequest, DecodedImage};

/// In-memory source: `count` samples of 4 bytes each, pts = index * 512.
pub(crate) struct StubSource {
    info: SourceInfo,
    params: ParameterSets,
    sync: Vec<u32>,
    count: u32,
}

impl StubSource {
    pub(crate) fn new(count: u32, sync: &[u32]) -> Self {
        Self {
            info: SourceInfo {
                codec: VideoCodec::H264,
                resolution: Resolution::new(640, 360),
                fps: Rational::FPS_30,
                duration: TimeCode::from_secs(f64::from(count) / 30.0),
                sample_count: count,
            },
            params: ParameterSets {
                sps: vec![0x67, 0x64],
                pps: vec![0x68, 0xEB],
                vps: None,
            },
            sync: sync.to_vec(),
            count,
        }
    }
}

impl MediaSource for StubSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn sample_count(&self) -> u32 {
        self.count
    }

    fn sample(&self, index: u32) -> Option<Sample> {
        (index < self.count).then(|| Sample {
            index,
            offset: u64::from(index) * 4,
            size: 4,
            pts: u64::from(index) * 512,
            is_sync: self.sync.contains(&index),
            chunk_index: 0,
        })
    }

    fn read_sample(&mut self, index: u32) -> Result<Option<Vec<u8>>, DemuxError> {
        Ok((index < self.count).then(|| vec![index as u8; 4]))
    }

    fn sync_indices(&self) -> &[u32] {
        &self.sync
    }

    fn parameter_sets(&self) -> &ParameterSets {
        &self.params
    }
}

/// Recording engine with scriptable invalid-session failures.
#[derive(Clone)]
pub(crate) struct FakeEngine {
    log: Arc<Mutex<Vec<(u32, bool)>>>,
    resets: Arc<Mutex<u32>>,
    invalid: Arc<Mutex<HashMap<u32, u32>>>,
    delay: Option<Duration>,
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            resets: Arc::new(Mutex::new(0)),
            invalid: Arc::new(Mutex::new(HashMap::new())),
            delay: None,
        }
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Make the next `times` decodes of `frame` fail with `InvalidSession`.
    pub(crate) fn fail_with_invalid_session(&self, frame: u32, times: u32) {
        self.invalid.lock().insert(frame, times);
    }

    /// Successfully decoded `(frame, discard)` pairs, in order.
    pub(crate) fn decoded(&self) -> Vec<(u32, bool)> {
        self.log.lock().clone()
    }

    pub(crate) fn resets(&self) -> u32 {
        *self.resets.lock()
    }
}

impl DecodeEngine for FakeEngine {
    fn decode(&mut self, request: &DecodeRequest<'_>) -> Result<DecodedImage, DecodeError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        {
            let mut invalid = self.invalid.lock();
            if let Some(remaining) = invalid.get_mut(&request.frame_index) {
                if *remaining > 0 {
                    *remaining = remaining.saturating_sub(1);
                    return Err(DecodeError::InvalidSession);
                }
            }
        }
        self.log.lock().push((request.frame_index, request.discard));
        Ok(DecodedImage {
            handle: u64::from(request.frame_index),
            resolution: Resolution::new(640, 360),
        })
    }

    fn reset(&mut self) -> Result<(), DecodeError> {
        *self.resets.lock() += 1;
        Ok(())
    }
}
