//! The decode worker: single owner of the media source and engine sessions.
//!
//! All decode submissions and completions are serialized on one thread; the
//! consumer-facing handle only reads the shared state under its lock. Seek
//! replay and invalid-session recovery run inline on the same thread, so
//! decode order is preserved without reentrant locking.

use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{Receiver, Sender};
use fc_common::DecodeError;
use fc_demux::MediaSource;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};

use crate::buffer::{DecodedFrame, FrameBuffer};
use crate::cursor::DecodeCursor;
use crate::engine::{DecodeEngine, DecodeRequest};
use crate::player::PlayerEvent;

/// Max consecutive session-reset replays before a decode failure surfaces.
const MAX_SESSION_RETRIES: u32 = 3;

/// Commands the handle sends to the worker.
pub(crate) enum Command {
    Decode { frame: u32, discard: bool },
    Seek { target: u32 },
    Close,
}

/// State shared between the worker and the consumer-facing handle.
pub(crate) struct Shared {
    pub buffer: FrameBuffer,
    pub cursor: DecodeCursor,
    /// First index with no backing data; requests at or past it are refused.
    pub finish_index: Option<u32>,
    /// Set once the consumer has popped its first frame or sought.
    pub started: bool,
}

pub(crate) struct PlaybackShared {
    pub state: Mutex<Shared>,
    pub cond: Condvar,
}

pub(crate) struct Worker<S: MediaSource, E: DecodeEngine> {
    source: S,
    engines: Vec<E>,
    shared: Arc<PlaybackShared>,
    events: Sender<PlayerEvent>,
    buffer_capacity: u32,
    session_retries: u32,
}

/// Greatest sync index strictly below `target`, falling back to the first.
fn find_sync_before(sync: &[u32], target: u32) -> Option<u32> {
    sync.iter()
        .rev()
        .find(|&&s| s < target)
        .or_else(|| sync.first())
        .copied()
}

impl<S: MediaSource, E: DecodeEngine> Worker<S, E> {
    pub(crate) fn new(
        source: S,
        engines: Vec<E>,
        shared: Arc<PlaybackShared>,
        events: Sender<PlayerEvent>,
        buffer_capacity: u32,
    ) -> Self {
        assert!(!engines.is_empty(), "worker needs at least one engine");
        Self {
            source,
            engines,
            shared,
            events,
            buffer_capacity,
            session_retries: 0,
        }
    }

    pub(crate) fn run(mut self, commands: Receiver<Command>) {
        debug!("decode worker started");
        while let Ok(cmd) = commands.recv() {
            match cmd {
                Command::Decode { frame, discard } => self.handle_decode(frame, discard),
                Command::Seek { target } => self.handle_seek(target),
                Command::Close => break,
            }
        }
        debug!("decode worker stopped");
    }

    /// Gated decode: out-of-sequence and post-finish requests are dropped.
    pub(crate) fn handle_decode(&mut self, frame: u32, discard: bool) {
        {
            let mut state = self.shared.state.lock();
            if let Some(finish) = state.finish_index {
                if frame >= finish {
                    return;
                }
            }
            if !state.cursor.admit(frame) {
                return;
            }
        }
        self.decode_now(frame, discard);
    }

    /// Seek protocol: clear, reset, replay from the nearest sync sample,
    /// then refill the look-ahead window behind the target.
    pub(crate) fn handle_seek(&mut self, target: u32) {
        info!(target, "seek started");
        let _ = self.events.send(PlayerEvent::SeekStarted { target });
        {
            let mut state = self.shared.state.lock();
            state.buffer.clear();
            state.cursor.reset();
            state.started = true;
        }
        self.session_retries = 0;
        self.replay_to(target, false);
        for frame in target..target.saturating_add(self.buffer_capacity) {
            self.handle_decode(frame, false);
        }
        let _ = self.events.send(PlayerEvent::SeekFinished { target });
        info!(target, "seek finished");
        self.shared.cond.notify_all();
    }

    /// Decode without consulting the gate (replay path) or after passing it.
    fn decode_now(&mut self, frame: u32, discard: bool) {
        let data = match self.source.read_sample(frame) {
            Ok(Some(data)) => data,
            Ok(None) => {
                self.mark_finished(frame);
                return;
            }
            Err(e) => {
                warn!(frame, "sample read failed: {e}");
                self.abandon(frame);
                return;
            }
        };
        let pts = self.source.sample(frame).map(|s| s.pts).unwrap_or_default();
        let engine = frame as usize % self.engines.len();
        let request = DecodeRequest {
            frame_index: frame,
            data: &data,
            pts,
            discard,
        };
        let begin = Instant::now();
        match self.engines[engine].decode(&request) {
            Ok(image) => {
                let latency = begin.elapsed();
                self.session_retries = 0;
                let mut state = self.shared.state.lock();
                state.cursor.complete(frame);
                if !discard {
                    state.buffer.insert(DecodedFrame {
                        frame_index: frame,
                        pts,
                        decode_latency: latency,
                        image,
                    });
                }
                trace!(frame, discard, ?latency, "decoded frame");
                drop(state);
                self.shared.cond.notify_all();
            }
            Err(DecodeError::InvalidSession) => self.recover_session(frame, discard),
            Err(e) => {
                warn!(frame, "decode failed: {e}");
                self.abandon(frame);
                let _ = self.events.send(PlayerEvent::DecodeFailed {
                    frame,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Reset the session and replay from the nearest preceding sync sample
    /// up to the failed frame, at most [`MAX_SESSION_RETRIES`] times in a row.
    fn recover_session(&mut self, frame: u32, discard: bool) {
        if self.session_retries >= MAX_SESSION_RETRIES {
            warn!(
                frame,
                retries = self.session_retries,
                "giving up on decoder session recovery"
            );
            self.abandon(frame);
            let _ = self.events.send(PlayerEvent::DecodeFailed {
                frame,
                reason: DecodeError::InvalidSession.to_string(),
            });
            return;
        }
        self.session_retries += 1;
        warn!(
            frame,
            attempt = self.session_retries,
            "invalid decoder session, resetting and replaying"
        );
        let engine = frame as usize % self.engines.len();
        if let Err(e) = self.engines[engine].reset() {
            warn!(frame, "session reset failed: {e}");
            self.abandon(frame);
            let _ = self.events.send(PlayerEvent::DecodeFailed {
                frame,
                reason: e.to_string(),
            });
            return;
        }
        self.abandon(frame);
        self.replay_to(frame, discard);
    }

    /// Decode `sync..target` discarding outputs, then `target` for real
    /// (unless the original request was itself a discard). Without any sync
    /// points the target is decoded directly.
    fn replay_to(&mut self, target: u32, discard_target: bool) {
        let from = find_sync_before(self.source.sync_indices(), target).unwrap_or(target);
        debug!(from, target, "replaying decode sequence");
        for frame in from..target {
            if self.past_finish(frame) {
                return;
            }
            self.decode_now(frame, true);
        }
        if !self.past_finish(target) {
            self.decode_now(target, discard_target);
        }
    }

    fn past_finish(&self, frame: u32) -> bool {
        self.shared
            .state
            .lock()
            .finish_index
            .is_some_and(|finish| frame >= finish)
    }

    fn mark_finished(&mut self, frame: u32) {
        let mut state = self.shared.state.lock();
        state.cursor.abandon(frame);
        if state.finish_index.is_none() {
            state.finish_index = Some(frame);
            info!(frame, "end of stream reached");
            let _ = self.events.send(PlayerEvent::Finished { at: frame });
        }
        drop(state);
        self.shared.cond.notify_all();
    }

    fn abandon(&mut self, frame: u32) {
        let mut state = self.shared.state.lock();
        state.cursor.abandon(frame);
        drop(state);
        self.shared.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{FakeEngine, StubSource};
    use crossbeam::channel;

    fn make_shared(capacity: usize) -> Arc<PlaybackShared> {
        Arc::new(PlaybackShared {
            state: Mutex::new(Shared {
                buffer: FrameBuffer::new(capacity),
                cursor: DecodeCursor::new(),
                finish_index: None,
                started: false,
            }),
            cond: Condvar::new(),
        })
    }

    fn make_worker(
        count: u32,
        sync: &[u32],
        capacity: u32,
    ) -> (
        Worker<StubSource, FakeEngine>,
        FakeEngine,
        Receiver<PlayerEvent>,
    ) {
        let engine = FakeEngine::new();
        let (tx, rx) = channel::unbounded();
        let worker = Worker::new(
            StubSource::new(count, sync),
            vec![engine.clone()],
            make_shared(capacity as usize),
            tx,
            capacity,
        );
        (worker, engine, rx)
    }

    #[test]
    fn warmup_fills_buffer_in_order() {
        let (mut worker, engine, _rx) = make_worker(10, &[0], 3);
        for frame in 0..3 {
            worker.handle_decode(frame, false);
        }
        let state = worker.shared.state.lock();
        assert!(state.buffer.is_full());
        assert_eq!(state.cursor.last_decoded(), Some(2));
        drop(state);
        assert_eq!(engine.decoded(), vec![(0, false), (1, false), (2, false)]);
    }

    #[test]
    fn out_of_sequence_request_is_dropped() {
        let (mut worker, engine, _rx) = make_worker(10, &[0], 3);
        worker.handle_decode(2, false); // nothing decoded yet, must start at 0
        assert!(engine.decoded().is_empty());
        worker.handle_decode(0, false);
        worker.handle_decode(5, false); // gap after 0
        assert_eq!(engine.decoded(), vec![(0, false)]);
    }

    #[test]
    fn end_of_stream_sets_finish_and_refuses_later_requests() {
        let (mut worker, engine, rx) = make_worker(2, &[0], 3);
        worker.handle_decode(0, false);
        worker.handle_decode(1, false);
        worker.handle_decode(2, false); // no data behind index 2
        {
            let state = worker.shared.state.lock();
            assert_eq!(state.finish_index, Some(2));
        }
        worker.handle_decode(2, false);
        worker.handle_decode(7, false);
        assert_eq!(engine.decoded().len(), 2);
        assert!(matches!(
            rx.try_recv(),
            Ok(PlayerEvent::Finished { at: 2 })
        ));
    }

    #[test]
    fn seek_replays_from_preceding_sync() {
        let (mut worker, engine, rx) = make_worker(90, &[0, 30, 60], 3);
        worker.handle_seek(45);

        let log = engine.decoded();
        let replay: Vec<(u32, bool)> = (30..45).map(|f| (f, true)).collect();
        assert_eq!(&log[..15], &replay[..]);
        assert_eq!(log[15], (45, false));
        // window refill behind the target
        assert_eq!(&log[16..], &[(46, false), (47, false)]);

        let state = worker.shared.state.lock();
        assert_eq!(state.buffer.head_index(), Some(45));
        assert_eq!(state.cursor.last_decoded(), Some(47));
        drop(state);

        assert!(matches!(rx.try_recv(), Ok(PlayerEvent::SeekStarted { target: 45 })));
        assert!(matches!(rx.try_recv(), Ok(PlayerEvent::SeekFinished { target: 45 })));
    }

    #[test]
    fn seek_without_sync_points_decodes_target_directly() {
        let (mut worker, engine, _rx) = make_worker(90, &[], 2);
        worker.handle_seek(40);
        assert_eq!(engine.decoded(), vec![(40, false), (41, false)]);
    }

    #[test]
    fn invalid_session_recovers_via_sync_replay() {
        let (mut worker, engine, _rx) = make_worker(20, &[0, 4], 3);
        engine.fail_with_invalid_session(6, 1);

        for frame in 0..7 {
            worker.handle_decode(frame, false);
        }
        assert_eq!(engine.resets(), 1);
        // after 0..5 decode normally, frame 6 fails once and is re-derived
        // by a discard replay from sync sample 4
        let log = engine.decoded();
        let tail = &log[log.len() - 3..];
        assert_eq!(tail, &[(4, true), (5, true), (6, false)]);

        let state = worker.shared.state.lock();
        assert_eq!(state.cursor.last_decoded(), Some(6));
    }

    #[test]
    fn session_recovery_gives_up_after_bound() {
        let (mut worker, engine, rx) = make_worker(20, &[0], 3);
        engine.fail_with_invalid_session(2, u32::MAX);

        for frame in 0..3 {
            worker.handle_decode(frame, false);
        }
        assert_eq!(engine.resets(), MAX_SESSION_RETRIES);
        let failed = rx
            .try_iter()
            .any(|e| matches!(e, PlayerEvent::DecodeFailed { frame: 2, .. }));
        assert!(failed);
        // frames before the failure stay available
        let state = worker.shared.state.lock();
        assert_eq!(state.buffer.head_index(), Some(0));
        assert_eq!(state.buffer.len(), 2);
    }
}
