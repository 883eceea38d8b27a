//! Host-facing lifecycle events.
//!
//! Hosts observe the player through exactly one [`PlayerCallbacks`] value at a
//! time. Every method has an empty default, so implement only what you show.
//! [`ChannelCallbacks`] turns the callbacks into a stream of [`PlayerEvent`]s.

use tokio::sync::mpsc;
use tracing::trace;

use crate::types::{QueuedTrack, TrackMetadata, TransitionPlan};

// ============================================================================
// Callback contract
// ============================================================================

/// Callbacks invoked by the session, always from the session's own task.
pub trait PlayerCallbacks: Send {
    /// A track became audible.
    fn track_started(&mut self, _track: &TrackMetadata) {}

    /// The last track finished playing.
    fn track_ended(&mut self) {}

    /// All queued audio has been played; the session is idle.
    fn queue_empty(&mut self) {}

    /// The server's upcoming queue changed.
    fn queue_updated(&mut self, _queue: &[QueuedTrack]) {}

    /// A recoverable failure: malformed frame, server error message.
    fn error(&mut self, _message: &str) {}

    fn transition_planned(&mut self, _plan: &TransitionPlan) {}

    fn transition_started(&mut self, _plan: &TransitionPlan) {}

    /// The server finished producing a crossfade. Audio may still be buffered.
    fn transition_completed(&mut self, _now_playing: &str) {}

    /// The "up next" hint was set (`Some`) or cleared (`None`).
    fn queued_next_updated(&mut self, _next: Option<&QueuedTrack>) {}

    fn connection_changed(&mut self, _connected: bool) {}
}

/// Callbacks that ignore everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl PlayerCallbacks for NoopCallbacks {}

// ============================================================================
// Event stream adapter
// ============================================================================

/// Owned form of a callback invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TrackStarted(TrackMetadata),
    TrackEnded,
    QueueEmpty,
    QueueUpdated(Vec<QueuedTrack>),
    Error(String),
    TransitionPlanned(TransitionPlan),
    TransitionStarted(TransitionPlan),
    TransitionCompleted { now_playing: String },
    QueuedNextUpdated(Option<QueuedTrack>),
    ConnectionChanged(bool),
}

/// Forwards every callback as a [`PlayerEvent`] on an unbounded channel.
///
/// # Example
///
/// ```ignore
/// let (callbacks, mut events) = ChannelCallbacks::new();
/// let client = StreamClient::spawn(config, Box::new(HeadlessOutput::new()), Box::new(callbacks));
/// while let Some(event) = events.recv().await {
///     if let PlayerEvent::TrackStarted(track) = event {
///         println!("now playing {}", track.title);
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelCallbacks {
    tx: mpsc::UnboundedSender<PlayerEvent>,
}

impl ChannelCallbacks {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: PlayerEvent) {
        trace!(?event, "Event");
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl PlayerCallbacks for ChannelCallbacks {
    fn track_started(&mut self, track: &TrackMetadata) {
        self.emit(PlayerEvent::TrackStarted(track.clone()));
    }

    fn track_ended(&mut self) {
        self.emit(PlayerEvent::TrackEnded);
    }

    fn queue_empty(&mut self) {
        self.emit(PlayerEvent::QueueEmpty);
    }

    fn queue_updated(&mut self, queue: &[QueuedTrack]) {
        self.emit(PlayerEvent::QueueUpdated(queue.to_vec()));
    }

    fn error(&mut self, message: &str) {
        self.emit(PlayerEvent::Error(message.to_string()));
    }

    fn transition_planned(&mut self, plan: &TransitionPlan) {
        self.emit(PlayerEvent::TransitionPlanned(plan.clone()));
    }

    fn transition_started(&mut self, plan: &TransitionPlan) {
        self.emit(PlayerEvent::TransitionStarted(plan.clone()));
    }

    fn transition_completed(&mut self, now_playing: &str) {
        self.emit(PlayerEvent::TransitionCompleted {
            now_playing: now_playing.to_string(),
        });
    }

    fn queued_next_updated(&mut self, next: Option<&QueuedTrack>) {
        self.emit(PlayerEvent::QueuedNextUpdated(next.cloned()));
    }

    fn connection_changed(&mut self, connected: bool) {
        self.emit(PlayerEvent::ConnectionChanged(connected));
    }
}
