//! Output with no sound card; the clock is wall time since creation.

use tokio::time::Instant;
use tracing::trace;

use super::AudioOutput;
use crate::Result;
use crate::pcm::StereoBuffer;

/// Output without a sound card.
///
/// The clock is elapsed monotonic time since creation; committed audio is
/// accounted for and dropped.
#[derive(Debug)]
pub struct HeadlessOutput {
    origin: Instant,
    committed_until: f64,
}

impl HeadlessOutput {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            committed_until: 0.0,
        }
    }

    /// End of the latest committed buffer on the clock.
    pub fn committed_until(&self) -> f64 {
        self.committed_until
    }
}

impl Default for HeadlessOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for HeadlessOutput {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn commit(&mut self, buffer: StereoBuffer, start: f64) -> Result<()> {
        let end = start.max(self.now()) + buffer.duration();
        trace!(start, end, frames = buffer.frames(), "Headless commit");
        self.committed_until = self.committed_until.max(end);
        Ok(())
    }

    fn stop(&mut self) {
        self.committed_until = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn clock_follows_monotonic_time() {
        let output = HeadlessOutput::new();
        assert_eq!(output.now(), 0.0);
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!((output.now() - 1.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let mut output = HeadlessOutput::new();
        output
            .commit(StereoBuffer::silence(44_100, 44_100), 0.0)
            .unwrap();
        assert!((output.committed_until() - 1.0).abs() < 1e-9);
        output.stop();
        output.stop();
        assert_eq!(output.committed_until(), 0.0);
    }
}
