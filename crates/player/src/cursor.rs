//! Sequential-decode gate.

use std::collections::BTreeSet;

use tracing::trace;

/// Tracks which frame may be submitted next.
///
/// Before any frame has completed, a small warm-up window is admitted in
/// flight order: frame 0 first, then whatever extends the pending set by
/// exactly one. Once a frame has completed, only `last_decoded + 1` passes.
/// Everything else is dropped, never queued.
#[derive(Debug, Default)]
pub struct DecodeCursor {
    last_decoded: Option<u32>,
    warmup: BTreeSet<u32>,
}

impl DecodeCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_decoded(&self) -> Option<u32> {
        self.last_decoded
    }

    /// Whether `frame` may be submitted now. Admission also registers the
    /// frame as in flight.
    pub fn admit(&mut self, frame: u32) -> bool {
        if self.warmup.contains(&frame) {
            return false; // already in flight
        }
        let admitted = match self.last_decoded {
            None => match self.warmup.last() {
                None => frame == 0,
                Some(&max_pending) => frame == max_pending + 1,
            },
            Some(last) => frame == last + 1,
        };
        if admitted {
            self.warmup.insert(frame);
        } else {
            trace!(
                frame,
                last = ?self.last_decoded,
                "decode request out of sequence, dropping"
            );
        }
        admitted
    }

    /// Record an asynchronous completion.
    pub fn complete(&mut self, frame: u32) {
        self.last_decoded = Some(frame);
        self.warmup.remove(&frame);
    }

    /// Drop an in-flight frame that will not complete (read failure, end of
    /// stream, abandoned session recovery).
    pub fn abandon(&mut self, frame: u32) {
        self.warmup.remove(&frame);
    }

    /// Back to `{none, empty}`; used at open and at each seek.
    pub fn reset(&mut self) {
        self.last_decoded = None;
        self.warmup.clear();
    }
}
