//! PCM decoding for binary audio frames.
//!
//! Frames carry interleaved little-endian signed 16-bit stereo samples,
//! four bytes per stereo frame.

use tracing::warn;

use crate::{Error, Result};

/// Bytes per interleaved stereo frame.
pub const BYTES_PER_FRAME: usize = 4;

const I16_SCALE: f32 = 32768.0;

/// A decoded, de-interleaved stereo buffer with samples in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoBuffer {
    /// A silent buffer of `frames` frames.
    pub fn silence(frames: usize, sample_rate: u32) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
            sample_rate,
        }
    }

    /// Number of stereo frames.
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample value across both channels.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(self.right.iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

/// Decode one binary frame.
///
/// A trailing partial frame is dropped. A payload holding less than one
/// whole stereo frame is an error.
pub fn decode_pcm(data: &[u8], sample_rate: u32) -> Result<StereoBuffer> {
    if sample_rate == 0 {
        return Err(Error::Decode("sample rate must be non-zero".to_string()));
    }
    if data.len() < BYTES_PER_FRAME {
        return Err(Error::Decode(format!(
            "frame of {} bytes holds no complete stereo sample",
            data.len()
        )));
    }

    let frames = data.chunks_exact(BYTES_PER_FRAME);
    let remainder = frames.remainder().len();
    if remainder != 0 {
        warn!(
            len = data.len(),
            dropped = remainder,
            "PCM frame length not a multiple of 4, dropping trailing bytes"
        );
    }

    let count = data.len() / BYTES_PER_FRAME;
    let mut left = Vec::with_capacity(count);
    let mut right = Vec::with_capacity(count);
    for frame in frames {
        left.push(i16::from_le_bytes([frame[0], frame[1]]) as f32 / I16_SCALE);
        right.push(i16::from_le_bytes([frame[2], frame[3]]) as f32 / I16_SCALE);
    }

    Ok(StereoBuffer {
        left,
        right,
        sample_rate,
    })
}
