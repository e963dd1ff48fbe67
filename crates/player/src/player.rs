//! Consumer-facing playback handle.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use fc_common::{DecodeError, PlayerConfig, PlayerError, PlayerResult};
use fc_demux::{MediaSource, SourceInfo};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::buffer::{DecodedFrame, FrameBuffer};
use crate::cursor::DecodeCursor;
use crate::engine::{DecodeEngine, EngineContext};
use crate::scheduler::{Command, PlaybackShared, Shared, Worker};

/// Notifications for external observers (audio resync, UI state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    SeekStarted { target: u32 },
    SeekFinished { target: u32 },
    /// End of stream: first frame index with no backing data.
    Finished { at: u32 },
    /// A decode gave up after bounded session-recovery retries.
    DecodeFailed { frame: u32, reason: String },
}

/// An open container with a running decode worker.
///
/// `consume_next` and `seek` are the only ways to touch the frame buffer;
/// `consume_next` never blocks, `seek` blocks up to the configured timeout.
pub struct Player {
    commands: Sender<Command>,
    events: Receiver<PlayerEvent>,
    shared: Arc<PlaybackShared>,
    worker: Option<JoinHandle<()>>,
    info: SourceInfo,
    config: PlayerConfig,
}

impl Player {
    /// Open a demuxed source: build one engine per configured worker via
    /// `factory`, spawn the decode worker, and issue the warm-up window.
    pub fn open<S, E, F>(source: S, config: PlayerConfig, mut factory: F) -> PlayerResult<Self>
    where
        S: MediaSource + 'static,
        E: DecodeEngine + 'static,
        F: FnMut(EngineContext<'_>) -> Result<E, DecodeError>,
    {
        config.validate().map_err(PlayerError::InvalidConfig)?;
        let info = source.info().clone();
        let parameter_sets = source.parameter_sets().clone();

        let engines = (0..config.worker_count)
            .map(|worker_index| {
                factory(EngineContext {
                    codec: info.codec,
                    resolution: info.resolution,
                    parameter_sets: &parameter_sets,
                    worker_index,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let shared = Arc::new(PlaybackShared {
            state: Mutex::new(Shared {
                buffer: FrameBuffer::new(config.buffer_capacity as usize),
                cursor: DecodeCursor::new(),
                finish_index: None,
                started: false,
            }),
            cond: Condvar::new(),
        });

        let (commands, command_rx) = channel::unbounded();
        let (event_tx, events) = channel::unbounded();
        let worker = Worker::new(
            source,
            engines,
            Arc::clone(&shared),
            event_tx,
            config.buffer_capacity,
        );
        let handle = thread::Builder::new()
            .name("fc-decode".into())
            .spawn(move || worker.run(command_rx))?;

        for frame in 0..config.buffer_capacity {
            let _ = commands.send(Command::Decode {
                frame,
                discard: false,
            });
        }
        info!(
            codec = info.codec.display_name(),
            resolution = %info.resolution,
            fps = %info.fps,
            samples = info.sample_count,
            buffer = config.buffer_capacity,
            workers = config.worker_count,
            "player opened"
        );
        Ok(Self {
            commands,
            events,
            shared,
            worker: Some(handle),
            info,
            config,
        })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// Event stream for external observers.
    pub fn events(&self) -> &Receiver<PlayerEvent> {
        &self.events
    }

    /// Pop the next frame if it is ready.
    ///
    /// Returns `None` while the first fill is still in progress, when the
    /// head of the buffer is not `expected`, or on a transient underrun; the
    /// renderer retries on its next tick. A successful pop tops up the
    /// look-ahead window.
    pub fn consume_next(&self, expected: u32) -> Option<DecodedFrame> {
        let mut state = self.shared.state.lock();
        if !state.started && !state.buffer.is_full() && state.finish_index.is_none() {
            return None; // wait for the initial fill
        }
        match state.buffer.pop_front_if(expected) {
            Some(frame) => {
                state.started = true;
                drop(state);
                let _ = self.commands.send(Command::Decode {
                    frame: expected.saturating_add(self.config.buffer_capacity),
                    discard: false,
                });
                Some(frame)
            }
            None => {
                let underrun =
                    state.started && state.buffer.is_empty() && state.finish_index.is_none();
                drop(state);
                if underrun {
                    // re-issue the window; the gate drops what is stale
                    for frame in expected..expected.saturating_add(self.config.buffer_capacity) {
                        let _ = self.commands.send(Command::Decode {
                            frame,
                            discard: false,
                        });
                    }
                }
                None
            }
        }
    }

    /// Random access. Blocks until the target frame has been decoded or the
    /// configured timeout elapses; a timeout keeps whatever progress was
    /// made and playback can continue from there.
    pub fn seek(&self, target: u32) -> PlayerResult<()> {
        {
            let mut state = self.shared.state.lock();
            state.buffer.clear();
            state.cursor.reset();
            state.started = true;
        }
        self.commands
            .send(Command::Seek { target })
            .map_err(|_| PlayerError::Closed)?;

        let timeout = Duration::from_millis(self.config.seek_timeout_ms);
        let mut state = self.shared.state.lock();
        let _ = self.shared.cond.wait_while_for(
            &mut state,
            |s| {
                let reached = s.cursor.last_decoded().is_some_and(|last| last >= target);
                let unreachable = s.finish_index.is_some_and(|finish| target >= finish);
                !reached && !unreachable
            },
            timeout,
        );
        let reached = state.cursor.last_decoded().is_some_and(|last| last >= target);
        drop(state);
        if reached {
            Ok(())
        } else {
            warn!(target, "seek did not reach its target in time");
            Err(PlayerError::SeekTimeout { target })
        }
    }

    /// End of stream reached and every buffered frame consumed.
    pub fn is_finished(&self) -> bool {
        let state = self.shared.state.lock();
        state.finish_index.is_some() && state.buffer.is_empty()
    }

    /// Tear down the decode worker. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = self.commands.send(Command::Close);
            let _ = handle.join();
            debug!("player closed");
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.close();
    }
}
