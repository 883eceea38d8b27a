//! Gapless placement of decoded chunks on the audio clock.
//!
//! Chunks are committed back-to-back: each starts exactly where the previous
//! one ended, unless the clock has already passed that point (underrun), in
//! which case it starts now. Whenever a chunk belongs to a track other than
//! the audible one, the start of that track's first chunk is recorded as a
//! [`ScheduledTransition`] for the transition monitor to act on.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::output::AudioOutput;
use crate::pcm::StereoBuffer;
use crate::registry::TrackRegistry;
use crate::types::{TrackId, TrackMetadata};

/// A decoded buffer tagged with the track it arrived under.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// `None` for audio that arrived before any track_start.
    pub track_id: Option<TrackId>,
    pub buffer: StereoBuffer,
}

impl AudioChunk {
    pub fn duration(&self) -> f64 {
        self.buffer.duration()
    }
}

/// The moment a track's first chunk becomes audible.
#[derive(Debug, Clone)]
pub struct ScheduledTransition {
    pub track_id: TrackId,
    /// Audio-clock time in seconds.
    pub scheduled_start: f64,
    pub metadata: Option<Arc<TrackMetadata>>,
}

/// Places chunks on the output clock and tracks pending track changes.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    pending: VecDeque<AudioChunk>,
    /// Sorted by `scheduled_start`, at most one per track id.
    transitions: Vec<ScheduledTransition>,
    next_commit_time: f64,
    committed: u64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chunk for commit, preserving arrival order.
    pub fn enqueue(&mut self, chunk: AudioChunk) {
        self.pending.push_back(chunk);
    }

    /// Commit every queued chunk to `output`. Returns how many were committed.
    ///
    /// A chunk the output rejects is skipped; it takes no time on the clock.
    pub fn flush(
        &mut self,
        output: &mut dyn AudioOutput,
        playing: Option<TrackId>,
        registry: &TrackRegistry,
    ) -> usize {
        let mut count = 0;
        while let Some(chunk) = self.pending.pop_front() {
            let track_id = chunk.track_id;
            let duration = chunk.duration();
            let start = self.next_commit_time.max(output.now());

            if let Err(e) = output.commit(chunk.buffer, start) {
                warn!(error = %e, ?track_id, start, "Chunk could not be scheduled, skipping");
                continue;
            }

            self.next_commit_time = start + duration;
            self.committed += 1;
            count += 1;
            trace!(?track_id, start, duration, "Chunk committed");

            if let Some(id) = track_id
                && Some(id) != playing
                && !self.has_pending_transition(id)
            {
                self.insert_transition(ScheduledTransition {
                    track_id: id,
                    scheduled_start: start,
                    metadata: registry.get(id),
                });
            }
        }
        count
    }

    fn insert_transition(&mut self, transition: ScheduledTransition) {
        debug!(
            track_id = transition.track_id,
            start = transition.scheduled_start,
            "Track change scheduled"
        );
        let at = self
            .transitions
            .partition_point(|t| t.scheduled_start <= transition.scheduled_start);
        self.transitions.insert(at, transition);
    }

    /// Remove and return the earliest transition if the clock has reached it.
    ///
    /// A transition counts as reached once `now >= scheduled_start - tolerance`.
    pub fn pop_due(&mut self, now: f64, tolerance: f64) -> Option<ScheduledTransition> {
        let first = self.transitions.first()?;
        if now >= first.scheduled_start - tolerance {
            Some(self.transitions.remove(0))
        } else {
            None
        }
    }

    pub fn has_pending_transition(&self, id: TrackId) -> bool {
        self.transitions.iter().any(|t| t.track_id == id)
    }

    pub fn pending_transitions(&self) -> &[ScheduledTransition] {
        &self.transitions
    }

    /// Chunks waiting to be committed.
    pub fn queued_chunks(&self) -> usize {
        self.pending.len()
    }

    /// Clock time at which the last committed chunk ends.
    pub fn next_commit_time(&self) -> f64 {
        self.next_commit_time
    }

    /// Total chunks committed since the last reset.
    pub fn committed_chunks(&self) -> u64 {
        self.committed
    }

    /// Nothing queued, nothing pending, and the clock has played it all.
    pub fn is_drained(&self, now: f64) -> bool {
        self.pending.is_empty() && self.transitions.is_empty() && now >= self.next_commit_time
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.transitions.clear();
        self.next_commit_time = 0.0;
        self.committed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ManualOutput;

    const RATE: u32 = 1_000;

    fn chunk(track_id: Option<TrackId>, seconds: f64) -> AudioChunk {
        AudioChunk {
            track_id,
            buffer: StereoBuffer::silence((seconds * RATE as f64) as usize, RATE),
        }
    }

    fn registry_with(titles: &[&str]) -> TrackRegistry {
        let mut registry = TrackRegistry::new();
        for title in titles {
            registry.register(TrackMetadata {
                title: title.to_string(),
                ..Default::default()
            });
        }
        registry
    }

    #[test]
    fn first_chunk_starts_at_current_clock() {
        let clock = ManualOutput::new();
        clock.set_time(3.25);
        let mut output = clock.clone();
        let mut scheduler = PlaybackScheduler::new();
        let registry = registry_with(&["A"]);

        scheduler.enqueue(chunk(Some(1), 0.5));
        assert_eq!(scheduler.flush(&mut output, None, &registry), 1);
        assert_eq!(clock.commits()[0].start, 3.25);
        assert_eq!(scheduler.next_commit_time(), 3.75);
    }

    #[test]
    fn chunks_are_back_to_back_across_tracks() {
        let clock = ManualOutput::new();
        let mut output = clock.clone();
        let mut scheduler = PlaybackScheduler::new();
        let registry = registry_with(&["A", "B"]);

        for _ in 0..3 {
            scheduler.enqueue(chunk(Some(1), 0.5));
        }
        scheduler.enqueue(chunk(Some(2), 0.5));
        scheduler.flush(&mut output, None, &registry);

        let starts: Vec<f64> = clock.commits().iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!(starts[3] - starts[0], 1.5);

        let pending = scheduler.pending_transitions();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].track_id, 1);
        assert_eq!(pending[1].track_id, 2);
        assert_eq!(pending[1].scheduled_start, 1.5);
        assert_eq!(pending[1].metadata.as_ref().unwrap().title, "B");
    }

    #[test]
    fn underrun_restarts_at_clock() {
        let clock = ManualOutput::new();
        let mut output = clock.clone();
        let mut scheduler = PlaybackScheduler::new();
        let registry = registry_with(&["A"]);

        scheduler.enqueue(chunk(Some(1), 0.5));
        scheduler.flush(&mut output, Some(1), &registry);
        clock.set_time(2.0);
        scheduler.enqueue(chunk(Some(1), 0.5));
        scheduler.flush(&mut output, Some(1), &registry);
        assert_eq!(clock.commits()[1].start, 2.0);
    }

    #[test]
    fn no_transition_for_audible_track_or_untagged_audio() {
        let mut output = ManualOutput::new();
        let mut scheduler = PlaybackScheduler::new();
        let registry = registry_with(&["A"]);

        scheduler.enqueue(chunk(Some(1), 0.5));
        scheduler.enqueue(chunk(None, 0.5));
        scheduler.flush(&mut output, Some(1), &registry);
        assert!(scheduler.pending_transitions().is_empty());
    }

    #[test]
    fn pop_due_respects_tolerance() {
        let mut output = ManualOutput::new();
        let mut scheduler = PlaybackScheduler::new();
        let registry = registry_with(&["A", "B"]);

        scheduler.enqueue(chunk(Some(1), 1.0));
        scheduler.enqueue(chunk(Some(2), 1.0));
        scheduler.flush(&mut output, None, &registry);

        assert_eq!(scheduler.pop_due(0.0, 0.02).unwrap().track_id, 1);
        assert!(scheduler.pop_due(0.97, 0.02).is_none());
        assert_eq!(scheduler.pop_due(0.985, 0.02).unwrap().track_id, 2);
        assert!(scheduler.pop_due(5.0, 0.02).is_none());
    }

    #[test]
    fn rejected_chunk_is_skipped_without_advancing() {
        let clock = ManualOutput::new();
        let mut output = clock.clone();
        let mut scheduler = PlaybackScheduler::new();
        let registry = registry_with(&["A"]);

        clock.fail_next_commits(1);
        scheduler.enqueue(chunk(Some(1), 0.5));
        scheduler.enqueue(chunk(Some(1), 0.5));
        assert_eq!(scheduler.flush(&mut output, None, &registry), 1);
        assert_eq!(scheduler.next_commit_time(), 0.5);
        assert_eq!(scheduler.queued_chunks(), 0);
    }

    #[test]
    fn drained_only_after_clock_reaches_end() {
        let clock = ManualOutput::new();
        let mut output = clock.clone();
        let mut scheduler = PlaybackScheduler::new();
        let registry = registry_with(&["A"]);

        scheduler.enqueue(chunk(Some(1), 1.0));
        scheduler.flush(&mut output, Some(1), &registry);
        assert!(!scheduler.is_drained(0.99));
        assert!(scheduler.is_drained(1.0));

        scheduler.reset();
        assert_eq!(scheduler.next_commit_time(), 0.0);
        assert_eq!(scheduler.committed_chunks(), 0);
    }
}
