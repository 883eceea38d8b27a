//! Track id assignment and per-track metadata.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::types::{TrackId, TrackMetadata};

/// Assigns monotonic track ids and remembers what each track is.
///
/// Every `track_start` registers a new track, whether or not an earlier one is
/// still audible, so metadata for several look-ahead tracks can exist before
/// any of their audio arrives.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    last_id: TrackId,
    tracks: HashMap<TrackId, Arc<TrackMetadata>>,
    streaming: Option<TrackId>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new track and make it the tag for incoming audio.
    pub fn register(&mut self, metadata: TrackMetadata) -> TrackId {
        self.last_id += 1;
        let id = self.last_id;
        debug!(track_id = id, title = %metadata.title, "Track registered");
        self.tracks.insert(id, Arc::new(metadata));
        self.streaming = Some(id);
        id
    }

    pub fn get(&self, id: TrackId) -> Option<Arc<TrackMetadata>> {
        self.tracks.get(&id).cloned()
    }

    /// The id newly arriving audio is tagged with.
    pub fn current_streaming_id(&self) -> Option<TrackId> {
        self.streaming
    }

    /// Sample rate declared by the most recent track, or `default`.
    pub fn streaming_sample_rate(&self, default: u32) -> u32 {
        self.streaming
            .and_then(|id| self.tracks.get(&id))
            .and_then(|meta| meta.sample_rate)
            .filter(|rate| *rate > 0)
            .unwrap_or(default)
    }

    /// Most recently assigned id (0 before the first track).
    pub fn last_id(&self) -> TrackId {
        self.last_id
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Forget stored metadata but keep counting, so ids stay unique.
    pub fn clear_metadata(&mut self) {
        self.tracks.clear();
    }

    /// Back to the initial state; the next id is 1 again.
    pub fn reset(&mut self) {
        self.last_id = 0;
        self.tracks.clear();
        self.streaming = None;
    }
}
