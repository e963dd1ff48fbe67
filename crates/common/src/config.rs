//! Playback configuration.

use serde::{Deserialize, Serialize};

/// Player configuration: look-ahead depth, decode workers, seek bound.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Look-ahead depth: frames kept decoded-but-unconsumed at once.
    pub buffer_capacity: u32,
    /// Number of parallel decoder instances, round-robined by frame index.
    pub worker_count: u32,
    /// Upper bound on a blocking seek, in milliseconds.
    pub seek_timeout_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 5,
            worker_count: 1,
            seek_timeout_ms: 2000,
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_capacity == 0 {
            return Err("buffer_capacity must be > 0".into());
        }
        if self.worker_count == 0 {
            return Err("worker_count must be > 0".into());
        }
        Ok(())
    }
}
