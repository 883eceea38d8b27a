//! Sound card output through cpal.
//!
//! Committed buffers are mixed in at their scheduled frame on a dedicated audio
//! thread; the clock counts frames the device has rendered.

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info, warn};

use super::AudioOutput;
use crate::pcm::StereoBuffer;
use crate::{Error, Result};

/// A committed buffer, interleaved stereo at the device rate.
struct Scheduled {
    start_frame: u64,
    samples: Vec<f32>,
}

impl Scheduled {
    fn end_frame(&self) -> u64 {
        self.start_frame + (self.samples.len() / 2) as u64
    }
}

/// State shared with the audio callback thread.
#[derive(Default)]
struct Mixer {
    /// Frames handed to the device so far; this is the clock.
    rendered: u64,
    scheduled: VecDeque<Scheduled>,
}

impl Mixer {
    fn render(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        let channels = channels.max(1);
        let frames = (out.len() / channels) as u64;
        let base = self.rendered;
        let window_end = base + frames;

        for buf in &self.scheduled {
            let from = buf.start_frame.max(base);
            let to = buf.end_frame().min(window_end);
            for frame in from..to {
                let src = ((frame - buf.start_frame) * 2) as usize;
                let dst = (frame - base) as usize * channels;
                let (left, right) = (buf.samples[src], buf.samples[src + 1]);
                if channels == 1 {
                    out[dst] += (left + right) * 0.5;
                } else {
                    out[dst] += left;
                    out[dst + 1] += right;
                }
            }
        }

        self.rendered = window_end;
        while self
            .scheduled
            .front()
            .is_some_and(|buf| buf.end_frame() <= self.rendered)
        {
            self.scheduled.pop_front();
        }
    }
}

/// Output to the system's default sound card.
///
/// The cpal stream lives on its own thread; the clock is the number of frames
/// the device has pulled, so it reflects what has actually been rendered.
pub struct DeviceOutput {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    shutdown: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceOutput {
    /// Open the default output device with its default configuration.
    pub fn open_default() -> Result<Self> {
        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        let thread_mixer = Arc::clone(&mixer);
        let thread = std::thread::Builder::new()
            .name("mixstream-audio".to_string())
            .spawn(move || {
                let stream = match build_stream(thread_mixer) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the output is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Audio thread stopped");
            })?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| Error::Output("audio thread exited during setup".to_string()))??;
        info!(sample_rate, "Audio device opened");

        Ok(Self {
            mixer,
            sample_rate,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn lock(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioOutput for DeviceOutput {
    fn now(&self) -> f64 {
        self.lock().rendered as f64 / self.sample_rate as f64
    }

    fn commit(&mut self, buffer: StereoBuffer, start: f64) -> Result<()> {
        if buffer.sample_rate == 0 {
            return Err(Error::Output("buffer has no sample rate".to_string()));
        }
        let samples = interleave_at_rate(&buffer, self.sample_rate);
        let mut mixer = self.lock();
        let start_frame = ((start.max(0.0) * self.sample_rate as f64).round() as u64)
            .max(mixer.rendered);
        mixer.scheduled.push_back(Scheduled {
            start_frame,
            samples,
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.lock().scheduled.clear();
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Audio thread panicked");
        }
    }
}

fn build_stream(mixer: Arc<Mutex<Mixer>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Output("no output device available".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| Error::Output(e.to_string()))?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(Error::Output(format!(
            "unsupported device sample format {:?}",
            supported.sample_format()
        )));
    }

    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                mixer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .render(data, channels);
            },
            |err| warn!(error = %err, "Audio stream error"),
            None,
        )
        .map_err(|e| Error::Output(e.to_string()))?;
    stream.play().map_err(|e| Error::Output(e.to_string()))?;

    Ok((stream, sample_rate))
}

/// Interleave to stereo at `rate`, linearly resampling when rates differ.
fn interleave_at_rate(buffer: &StereoBuffer, rate: u32) -> Vec<f32> {
    let frames = buffer.frames();
    if frames == 0 {
        return Vec::new();
    }
    if buffer.sample_rate == rate {
        return buffer
            .left
            .iter()
            .zip(&buffer.right)
            .flat_map(|(l, r)| [*l, *r])
            .collect();
    }

    let step = buffer.sample_rate as f64 / rate as f64;
    let out_frames = (frames as f64 / step).round() as usize;
    let mut out = Vec::with_capacity(out_frames * 2);
    for i in 0..out_frames {
        let pos = i as f64 * step;
        let idx = (pos.floor() as usize).min(frames - 1);
        let next = (idx + 1).min(frames - 1);
        let frac = (pos - idx as f64) as f32;
        out.push(buffer.left[idx] + (buffer.left[next] - buffer.left[idx]) * frac);
        out.push(buffer.right[idx] + (buffer.right[next] - buffer.right[idx]) * frac);
    }
    out
}
