//! Hand-driven output clock that records every commit.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::AudioOutput;
use crate::pcm::StereoBuffer;
use crate::{Error, Result};

/// Record of one committed buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedBuffer {
    pub start: f64,
    pub duration: f64,
    pub frames: usize,
}

#[derive(Debug, Default)]
struct ManualState {
    now: f64,
    commits: Vec<CommittedBuffer>,
    stops: usize,
    failures_pending: usize,
}

/// Output whose clock only moves when told to.
///
/// Clones share the same clock, so a test can hand one clone to a session and
/// keep another to advance time and inspect commits.
#[derive(Debug, Clone, Default)]
pub struct ManualOutput {
    state: Arc<Mutex<ManualState>>,
}

impl ManualOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_time(&self, seconds: f64) {
        let mut state = self.lock();
        state.now = state.now.max(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.lock().now += seconds.max(0.0);
    }

    /// Buffers committed since the last stop.
    pub fn commits(&self) -> Vec<CommittedBuffer> {
        self.lock().commits.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.lock().stops
    }

    /// Make the next `count` commits fail.
    pub fn fail_next_commits(&self, count: usize) {
        self.lock().failures_pending = count;
    }
}

impl AudioOutput for ManualOutput {
    fn now(&self) -> f64 {
        self.lock().now
    }

    fn commit(&mut self, buffer: StereoBuffer, start: f64) -> Result<()> {
        let mut state = self.lock();
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(Error::Output("buffer rejected".to_string()));
        }
        state.commits.push(CommittedBuffer {
            start,
            duration: buffer.duration(),
            frames: buffer.frames(),
        });
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.commits.clear();
        state.stops += 1;
    }
}
