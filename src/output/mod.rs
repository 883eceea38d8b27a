//! Audio outputs and the playback clock they own.
//!
//! The output's clock is the only time base used for scheduling and for
//! deciding what is audible. Implementations:
//! - [`HeadlessOutput`] - monotonic clock, samples discarded
//! - [`ManualOutput`] - clock driven by hand, for tests and simulations
//! - `DeviceOutput` - a real sound card via cpal (feature `device`)

mod headless;
mod manual;
#[cfg(feature = "device")]
mod device;

pub use headless::HeadlessOutput;
pub use manual::{CommittedBuffer, ManualOutput};
#[cfg(feature = "device")]
pub use device::DeviceOutput;

use crate::Result;
use crate::pcm::StereoBuffer;

/// A sink that plays buffers at given positions on its own clock.
pub trait AudioOutput: Send {
    /// Current clock position in seconds. Monotonic.
    fn now(&self) -> f64;

    /// Play `buffer` starting at clock position `start` (seconds).
    ///
    /// A start already in the past plays as soon as possible.
    fn commit(&mut self, buffer: StereoBuffer, start: f64) -> Result<()>;

    /// Silence and drop everything committed. Calling this on a stopped
    /// output does nothing.
    fn stop(&mut self);
}

impl<O: AudioOutput + ?Sized> AudioOutput for Box<O> {
    fn now(&self) -> f64 {
        (**self).now()
    }

    fn commit(&mut self, buffer: StereoBuffer, start: f64) -> Result<()> {
        (**self).commit(buffer, start)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}
