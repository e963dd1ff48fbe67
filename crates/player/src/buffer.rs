//! Capacity-bounded frame buffer, kept in presentation order.

use std::time::Duration;

use tracing::warn;

use crate::engine::DecodedImage;

/// A decoded frame waiting to be consumed.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame_index: u32,
    /// Presentation timestamp in media ticks.
    pub pts: u64,
    /// Wall time the engine spent on this frame.
    pub decode_latency: Duration,
    pub image: DecodedImage,
}

/// Ordered collection of decoded frames, at most `capacity` entries,
/// strictly increasing pts, no duplicate frame indices.
#[derive(Debug)]
pub struct FrameBuffer {
    frames: Vec<DecodedFrame>,
    capacity: usize,
}

impl FrameBuffer {
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "FrameBuffer capacity must be > 0");
        Self {
            frames: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Insert in pts order. A duplicate frame index or a full buffer drops
    /// the frame (the scheduler must not overrun its own look-ahead window).
    pub fn insert(&mut self, frame: DecodedFrame) -> bool {
        if self.frames.iter().any(|f| f.frame_index == frame.frame_index) {
            warn!(frame = frame.frame_index, "dropping duplicate buffered frame");
            return false;
        }
        if self.is_full() {
            warn!(
                frame = frame.frame_index,
                capacity = self.capacity,
                "frame buffer overrun, dropping frame"
            );
            return false;
        }
        let at = self.frames.partition_point(|f| f.pts <= frame.pts);
        self.frames.insert(at, frame);
        true
    }

    /// Pop the oldest frame only when its index matches `expected`.
    pub fn pop_front_if(&mut self, expected: u32) -> Option<DecodedFrame> {
        if self.frames.first()?.frame_index != expected {
            return None;
        }
        Some(self.frames.remove(0))
    }

    /// Frame index at the head of the buffer, if any.
    pub fn head_index(&self) -> Option<u32> {
        self.frames.first().map(|f| f.frame_index)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
