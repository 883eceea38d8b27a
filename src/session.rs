//! The playback session: every piece of mutable player state in one place.
//!
//! [`Session`] routes inbound frames, feeds decoded audio to the scheduler and
//! runs the two clock-driven monitors:
//!
//! - **Transition monitor** ([`Session::poll_transitions`]): the only code
//!   that decides a track is audible. It fires `track_started` when the
//!   output clock reaches the first scheduled chunk of a new track.
//! - **Completion monitor** ([`Session::poll_completion`]): after the server
//!   signals `queue_empty`, declares the session finished once all committed
//!   audio has actually played.
//!
//! The session is not thread-safe by itself; the client drives it from a
//! single task.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::Frame;
use crate::event::{NoopCallbacks, PlayerCallbacks};
use crate::msg::{self, ControlMessage};
use crate::output::AudioOutput;
use crate::pcm;
use crate::registry::TrackRegistry;
use crate::scheduler::{AudioChunk, PlaybackScheduler, ScheduledTransition};
use crate::types::{QueuedTrack, TrackId, TrackMetadata, TransitionPlan};

/// Session-level status flags.
///
/// `streaming_complete` implies `queue_signaled_empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionFlags {
    pub connected: bool,
    pub playing: bool,
    pub transitioning: bool,
    pub queue_signaled_empty: bool,
    pub streaming_complete: bool,
}

/// Where the current crossfade plan is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlanState {
    /// No plan.
    Idle,
    /// A plan was announced; the server has not started the crossfade.
    Planned,
    /// The server is producing crossfade audio.
    Active,
}

/// Point-in-time view of the session for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub flags: SessionFlags,
    pub current_playing_track_id: Option<TrackId>,
    pub current_streaming_track_id: Option<TrackId>,
    pub current_track: Option<TrackMetadata>,
    pub plan: Option<TransitionPlan>,
    pub plan_state: PlanState,
    pub queued_next: Option<QueuedTrack>,
    pub upcoming: Vec<QueuedTrack>,
    pub registered_tracks: usize,
    pub pending_transitions: usize,
    pub queued_chunks: usize,
    pub next_commit_time: f64,
}

/// Owned state of one playback session.
pub struct Session {
    output: Box<dyn AudioOutput>,
    callbacks: Box<dyn PlayerCallbacks>,
    registry: TrackRegistry,
    scheduler: PlaybackScheduler,
    flags: SessionFlags,
    tolerance: f64,
    default_sample_rate: u32,
    current_playing: Option<TrackId>,
    current_track: Option<Arc<TrackMetadata>>,
    plan: Option<TransitionPlan>,
    queued_next: Option<QueuedTrack>,
    upcoming: Vec<QueuedTrack>,
    transition_monitor: bool,
    completion_monitor: bool,
}

impl Session {
    pub fn new(output: Box<dyn AudioOutput>, config: &ClientConfig) -> Self {
        Self {
            output,
            callbacks: Box::new(NoopCallbacks),
            registry: TrackRegistry::new(),
            scheduler: PlaybackScheduler::new(),
            flags: SessionFlags::default(),
            tolerance: config.schedule_tolerance(),
            default_sample_rate: config.default_sample_rate,
            current_playing: None,
            current_track: None,
            plan: None,
            queued_next: None,
            upcoming: Vec::new(),
            transition_monitor: false,
            completion_monitor: false,
        }
    }

    /// Replace the active callback set.
    pub fn set_callbacks(&mut self, callbacks: Box<dyn PlayerCallbacks>) {
        self.callbacks = callbacks;
    }

    // ------------------------------------------------------------------------
    // Inbound frames
    // ------------------------------------------------------------------------

    pub fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Control(text) => self.handle_text(&text),
            Frame::Audio(data) => self.handle_binary(&data),
        }
    }

    /// Parse and apply one text frame. Malformed payloads go to the error callback.
    pub fn handle_text(&mut self, text: &str) {
        match msg::parse_control(text) {
            Ok(message) => self.handle_control(message),
            Err(e) => {
                warn!(error = %e, "RX: Malformed control message");
                self.callbacks
                    .error(&format!("malformed control message: {e}"));
            }
        }
    }

    /// Decode one binary frame and schedule it under the current streaming track.
    pub fn handle_binary(&mut self, data: &[u8]) {
        let sample_rate = self.registry.streaming_sample_rate(self.default_sample_rate);
        let buffer = match pcm::decode_pcm(data, sample_rate) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(error = %e, len = data.len(), "RX: Undecodable audio frame");
                self.callbacks.error(&e.to_string());
                return;
            }
        };

        let track_id = self.registry.current_streaming_id();
        self.scheduler.enqueue(AudioChunk { track_id, buffer });
        let committed =
            self.scheduler
                .flush(self.output.as_mut(), self.current_playing, &self.registry);
        if committed > 0 {
            self.flags.playing = true;
            self.flags.streaming_complete = false;
            self.transition_monitor = true;
        }
    }

    pub fn handle_control(&mut self, message: ControlMessage) {
        debug!(kind = message.kind(), "RX: Control message");
        match message {
            ControlMessage::TrackStart { track } => {
                let id = self.registry.register(track);
                info!(track_id = id, "Track announced");
                self.flags.queue_signaled_empty = false;
                self.flags.streaming_complete = false;
                self.completion_monitor = false;
                self.transition_monitor = true;
            }

            ControlMessage::TrackEnd => {
                // End of bytes, not end of sound; completion is clock-driven.
                debug!(
                    track_id = ?self.registry.current_streaming_id(),
                    "Server finished sending track"
                );
            }

            ControlMessage::QueueEmpty => {
                info!("Server queue empty, waiting for playback to drain");
                self.flags.queue_signaled_empty = true;
                self.completion_monitor = true;
            }

            ControlMessage::Queued { message, queue } => {
                debug!(
                    message = message.as_deref().unwrap_or_default(),
                    len = queue.queue.len(),
                    "Queue updated"
                );
                self.upcoming = queue.queue;
                self.callbacks.queue_updated(&self.upcoming);
                if let Some(first) = self.upcoming.first().cloned() {
                    self.set_queued_next(first);
                }
            }

            ControlMessage::AutoQueued { track } => {
                self.set_queued_next(QueuedTrack {
                    is_auto_queued: true,
                    ..track
                });
            }

            ControlMessage::TransitionPlanned {
                transition,
                next_track,
            } => {
                let plan = msg::normalize_transition(&transition);
                debug!(song_a = %plan.song_a, song_b = %plan.song_b, "Transition planned");
                self.callbacks.transition_planned(&plan);
                self.plan = Some(plan);
                if let Some(next) = next_track {
                    self.set_queued_next(next);
                }
            }

            ControlMessage::TransitionStart { transition } => {
                let announced = transition.as_object().is_some_and(|o| !o.is_empty());
                let plan = match (&self.plan, announced) {
                    (Some(stored), false) => stored.clone(),
                    _ => msg::normalize_transition(&transition),
                };
                if announced || self.plan.is_none() {
                    self.plan = Some(plan.clone());
                }
                self.flags.transitioning = true;
                self.callbacks.transition_started(&plan);
            }

            ControlMessage::TransitionComplete { now_playing } => {
                // Only means the crossfade bytes are all sent; the plan and the
                // transitioning flag stay until the audio itself changes track.
                let title = now_playing.map(|n| n.title).unwrap_or_default();
                debug!(now_playing = %title, "Server finished crossfade");
                self.callbacks.transition_completed(&title);
            }

            ControlMessage::Error { message } => {
                warn!(message = %message, "Server reported error");
                self.callbacks.error(&message);
            }

            ControlMessage::Unrecognized => {}
        }
    }

    fn set_queued_next(&mut self, next: QueuedTrack) {
        self.callbacks.queued_next_updated(Some(&next));
        self.queued_next = Some(next);
    }

    // ------------------------------------------------------------------------
    // Monitors
    // ------------------------------------------------------------------------

    /// Execute every scheduled track change the clock has reached.
    ///
    /// Returns the number of `track_started` events fired.
    pub fn poll_transitions(&mut self) -> usize {
        if !self.transition_monitor {
            return 0;
        }
        let now = self.output.now();
        let mut fired = 0;
        while let Some(transition) = self.scheduler.pop_due(now, self.tolerance) {
            self.execute_transition(transition, now);
            fired += 1;
        }
        fired
    }

    fn execute_transition(&mut self, transition: ScheduledTransition, now: f64) {
        let ScheduledTransition {
            track_id,
            scheduled_start,
            metadata,
        } = transition;

        self.current_playing = Some(track_id);
        self.current_track = metadata.clone();
        self.plan = None;
        self.flags.transitioning = false;

        let Some(track) = metadata else {
            warn!(track_id, "Audible track has no metadata");
            return;
        };

        info!(
            track_id,
            title = %track.title,
            scheduled_start,
            clock = now,
            "Track started"
        );

        if self
            .queued_next
            .as_ref()
            .is_some_and(|next| next.matches_title(&track.title))
        {
            self.queued_next = None;
            self.callbacks.queued_next_updated(None);
        }
        self.callbacks.track_started(&track);
    }

    /// Check for end of session. Returns `true` when completion fired.
    pub fn poll_completion(&mut self) -> bool {
        if !self.completion_monitor || !self.flags.queue_signaled_empty {
            return false;
        }
        let now = self.output.now();
        if !self.scheduler.is_drained(now) {
            return false;
        }

        info!(clock = now, "Playback drained, session complete");
        self.transition_monitor = false;
        self.completion_monitor = false;
        self.flags.streaming_complete = true;
        self.flags.playing = false;
        self.flags.transitioning = false;
        self.current_playing = None;
        self.current_track = None;
        self.plan = None;
        self.registry.clear_metadata();

        if self.queued_next.take().is_some() {
            self.callbacks.queued_next_updated(None);
        }
        if !self.upcoming.is_empty() {
            self.upcoming.clear();
            self.callbacks.queue_updated(&[]);
        }
        self.callbacks.track_ended();
        self.callbacks.queue_empty();
        true
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Record the transport state, notifying the host on change.
    pub fn set_connected(&mut self, connected: bool) {
        if self.flags.connected != connected {
            self.flags.connected = connected;
            self.callbacks.connection_changed(connected);
        }
    }

    /// Stop audio and return every counter, map and queue to its initial state.
    ///
    /// Safe to call repeatedly. Leaves the `connected` flag and the callbacks alone.
    pub fn reset(&mut self) {
        self.output.stop();
        self.registry.reset();
        self.scheduler.reset();
        self.flags = SessionFlags {
            connected: self.flags.connected,
            ..SessionFlags::default()
        };
        self.current_playing = None;
        self.current_track = None;
        self.plan = None;
        self.queued_next = None;
        self.upcoming.clear();
        self.transition_monitor = false;
        self.completion_monitor = false;
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn current_playing_track_id(&self) -> Option<TrackId> {
        self.current_playing
    }

    pub fn current_streaming_track_id(&self) -> Option<TrackId> {
        self.registry.current_streaming_id()
    }

    pub fn current_track(&self) -> Option<&TrackMetadata> {
        self.current_track.as_deref()
    }

    pub fn plan(&self) -> Option<&TransitionPlan> {
        self.plan.as_ref()
    }

    pub fn plan_state(&self) -> PlanState {
        match (&self.plan, self.flags.transitioning) {
            (_, true) => PlanState::Active,
            (Some(_), false) => PlanState::Planned,
            (None, false) => PlanState::Idle,
        }
    }

    pub fn queued_next(&self) -> Option<&QueuedTrack> {
        self.queued_next.as_ref()
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn transition_monitor_active(&self) -> bool {
        self.transition_monitor
    }

    pub fn completion_monitor_active(&self) -> bool {
        self.completion_monitor
    }

    /// Current output clock in seconds.
    pub fn clock(&self) -> f64 {
        self.output.now()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            flags: self.flags,
            current_playing_track_id: self.current_playing,
            current_streaming_track_id: self.registry.current_streaming_id(),
            current_track: self.current_track.as_deref().cloned(),
            plan: self.plan.clone(),
            plan_state: self.plan_state(),
            queued_next: self.queued_next.clone(),
            upcoming: self.upcoming.clone(),
            registered_tracks: self.registry.len(),
            pending_transitions: self.scheduler.pending_transitions().len(),
            queued_chunks: self.scheduler.queued_chunks(),
            next_commit_time: self.scheduler.next_commit_time(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
