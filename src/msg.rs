//! Wire messages exchanged with the mixing server.
//!
//! - [`ControlMessage`] - inbound JSON text frames, decoded once at the boundary
//! - [`OutboundCommand`] - commands sent by the client
//! - [`normalize_transition`] - adapter for the several transition payload dialects

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::types::{QueuedTrack, TrackMetadata, TransitionPlan};
use crate::{Error, Result};

// ============================================================================
// Inbound
// ============================================================================

/// A control message received as a text frame, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// A new logical track begins; binary frames that follow belong to it.
    TrackStart {
        #[serde(default)]
        track: TrackMetadata,
    },

    /// The server finished sending a track's bytes.
    TrackEnd,

    /// The server has nothing more queued.
    QueueEmpty,

    /// The upcoming queue changed.
    Queued {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        queue: QueueEnvelope,
    },

    /// The server picked the next track on its own.
    AutoQueued { track: QueuedTrack },

    /// A crossfade into the next track has been planned.
    TransitionPlanned {
        #[serde(default)]
        transition: Value,
        #[serde(default)]
        next_track: Option<QueuedTrack>,
    },

    /// The server started producing crossfade audio.
    TransitionStart {
        #[serde(default)]
        transition: Value,
    },

    /// The server finished producing crossfade audio.
    TransitionComplete {
        #[serde(default)]
        now_playing: Option<NowPlaying>,
    },

    /// Server-reported failure.
    Error {
        #[serde(default)]
        message: String,
    },

    /// Any `type` this client does not know.
    #[serde(other)]
    Unrecognized,
}

/// Wrapper object around the queue list in `queued` messages.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct QueueEnvelope {
    #[serde(default)]
    pub queue: Vec<QueuedTrack>,
}

/// `now_playing` field of `transition_complete`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NowPlaying {
    #[serde(default)]
    pub title: String,
}

impl ControlMessage {
    /// The wire discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::TrackStart { .. } => "track_start",
            ControlMessage::TrackEnd => "track_end",
            ControlMessage::QueueEmpty => "queue_empty",
            ControlMessage::Queued { .. } => "queued",
            ControlMessage::AutoQueued { .. } => "auto_queued",
            ControlMessage::TransitionPlanned { .. } => "transition_planned",
            ControlMessage::TransitionStart { .. } => "transition_start",
            ControlMessage::TransitionComplete { .. } => "transition_complete",
            ControlMessage::Error { .. } => "error",
            ControlMessage::Unrecognized => "unrecognized",
        }
    }
}

/// Parse a text frame into a [`ControlMessage`].
///
/// Fails on invalid JSON, a missing `type`, or a known type whose body does not
/// match. Unknown types parse successfully as [`ControlMessage::Unrecognized`].
pub fn parse_control(text: &str) -> Result<ControlMessage> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::Protocol("control message without a type".to_string()))?;

    let msg: ControlMessage = serde_json::from_value(value)?;
    if msg == ControlMessage::Unrecognized {
        debug!(kind = %kind, "RX: Unrecognized control message type");
    }
    Ok(msg)
}

// ============================================================================
// Transition payload normalization
// ============================================================================

const SONG_A: &[&str] = &["song_a", "songA"];
const SONG_B: &[&str] = &["song_b", "songB"];
const EXIT_SEGMENT: &[&str] = &["exit_segment", "exitSegment"];
const ENTRY_SEGMENT: &[&str] = &["entry_segment", "entrySegment"];
const SCORE: &[&str] = &["score"];
const CROSSFADE_DURATION: &[&str] = &["crossfade_duration", "crossfadeDuration"];
const TRANSITION_START_TIME: &[&str] =
    &["transition_start_time", "transitionStartTime", "start_time"];
const SONG_B_START_OFFSET: &[&str] = &["song_b_start_offset", "songBStartOffset"];

/// Build a [`TransitionPlan`] from whichever field-name dialect the server used.
///
/// The first present alias wins. Numbers may arrive as JSON numbers or numeric
/// strings. Missing values fall back to the plan defaults.
pub fn normalize_transition(payload: &Value) -> TransitionPlan {
    let defaults = TransitionPlan::default();
    TransitionPlan {
        song_a: text_field(payload, SONG_A),
        song_b: text_field(payload, SONG_B),
        exit_segment: text_field(payload, EXIT_SEGMENT),
        entry_segment: text_field(payload, ENTRY_SEGMENT),
        score: number_field(payload, SCORE).unwrap_or(defaults.score),
        crossfade_duration: number_field(payload, CROSSFADE_DURATION)
            .unwrap_or(defaults.crossfade_duration),
        transition_start_time: number_field(payload, TRANSITION_START_TIME)
            .unwrap_or(defaults.transition_start_time),
        song_b_start_offset: number_field(payload, SONG_B_START_OFFSET)
            .unwrap_or(defaults.song_b_start_offset),
    }
}

fn text_field(payload: &Value, aliases: &[&str]) -> String {
    aliases
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn number_field(payload: &Value, aliases: &[&str]) -> Option<f64> {
    aliases.iter().find_map(|key| match payload.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

// ============================================================================
// Outbound
// ============================================================================

/// Commands sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// Ask for a song or mix.
    Prompt { data: String },
    /// New ordering of the upcoming queue, as indices into the current order.
    ReorderQueue { new_order: Vec<usize> },
}

impl OutboundCommand {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_track_start() {
        let msg = parse_control(
            r#"{"type":"track_start","track":{"title":"One More Time","artist":"Daft Punk",
                "bpm":123,"key":"D major","duration":320.5,"sample_rate":48000}}"#,
        )
        .unwrap();
        let ControlMessage::TrackStart { track } = msg else {
            panic!("expected track_start, got {msg:?}");
        };
        assert_eq!(track.title, "One More Time");
        assert_eq!(track.sample_rate, Some(48_000));
        assert_eq!(track.duration, 320.5);
    }

    #[test]
    fn parses_unit_messages_with_empty_bodies() {
        assert_eq!(
            parse_control(r#"{"type":"track_end"}"#).unwrap(),
            ControlMessage::TrackEnd
        );
        assert_eq!(
            parse_control(r#"{"type":"queue_empty","extra":1}"#).unwrap(),
            ControlMessage::QueueEmpty
        );
    }

    #[test]
    fn parses_nested_queue_list() {
        let msg = parse_control(
            r#"{"type":"queued","message":"added","queue":{"queue":[
                {"title":"A","artist":"X","is_auto_queued":false},
                {"title":"B","artist":"Y","is_auto_queued":true}]}}"#,
        )
        .unwrap();
        let ControlMessage::Queued { message, queue } = msg else {
            panic!("expected queued");
        };
        assert_eq!(message.as_deref(), Some("added"));
        assert_eq!(queue.queue.len(), 2);
        assert!(queue.queue[1].is_auto_queued);
    }

    #[test]
    fn unknown_type_is_unrecognized_not_an_error() {
        let msg = parse_control(r#"{"type":"waveform","peaks":[1,2,3]}"#).unwrap();
        assert_eq!(msg, ControlMessage::Unrecognized);
    }

    #[test]
    fn missing_type_is_a_protocol_error() {
        let err = parse_control(r#"{"track":{}}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let err = parse_control("{not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn known_type_with_wrong_body_fails() {
        let err = parse_control(r#"{"type":"track_start","track":"nope"}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn normalizes_snake_case_transition() {
        let plan = normalize_transition(&json!({
            "song_a": "A", "song_b": "B",
            "exit_segment": "outro", "entry_segment": "intro",
            "score": 8.5, "crossfade_duration": 12, "transition_start_time": 180.25,
            "song_b_start_offset": 4
        }));
        assert_eq!(plan.song_a, "A");
        assert_eq!(plan.song_b, "B");
        assert_eq!(plan.exit_segment, "outro");
        assert_eq!(plan.entry_segment, "intro");
        assert_eq!(plan.score, 8.5);
        assert_eq!(plan.crossfade_duration, 12.0);
        assert_eq!(plan.transition_start_time, 180.25);
        assert_eq!(plan.song_b_start_offset, 4.0);
    }

    #[test]
    fn normalizes_camel_case_and_start_time_alias() {
        let plan = normalize_transition(&json!({
            "songA": "A", "songB": "B", "exitSegment": "drop", "entrySegment": "build-up",
            "crossfadeDuration": "6.5", "start_time": 90
        }));
        assert_eq!(plan.song_b, "B");
        assert_eq!(plan.entry_segment, "build-up");
        assert_eq!(plan.crossfade_duration, 6.5);
        assert_eq!(plan.transition_start_time, 90.0);
    }

    #[test]
    fn missing_transition_fields_take_defaults() {
        let plan = normalize_transition(&Value::Null);
        assert_eq!(plan, TransitionPlan::default());
        assert_eq!(plan.crossfade_duration, 8.0);
        assert_eq!(plan.transition_start_time, 0.0);
        assert_eq!(plan.song_b_start_offset, 0.0);
    }

    #[test]
    fn outbound_commands_serialize_with_type_tag() {
        let prompt = OutboundCommand::Prompt {
            data: "deep house".to_string(),
        };
        assert_eq!(
            prompt.to_json().unwrap(),
            r#"{"type":"prompt","data":"deep house"}"#
        );

        let reorder = OutboundCommand::ReorderQueue {
            new_order: vec![2, 0, 1],
        };
        assert_eq!(
            reorder.to_json().unwrap(),
            r#"{"type":"reorder_queue","new_order":[2,0,1]}"#
        );
    }
}
