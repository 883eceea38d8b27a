//! Core data types for mixstream.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Identifier of a logical track, assigned in track_start arrival order.
///
/// Ids start at 1 and are never reused within a session.
pub type TrackId = u64;

/// Metadata announced by a `track_start` control message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackMetadata {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub artist: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub bpm: f64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub key: String,
    /// Duration in seconds as reported by the server.
    #[serde(default, deserialize_with = "lenient_number")]
    pub duration: f64,
    /// Sample rate of the PCM that follows, if the server declared one.
    #[serde(default, deserialize_with = "lenient_rate")]
    pub sample_rate: Option<u32>,
}

/// An entry of the server's upcoming queue, also used for the "queued next" hint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueuedTrack {
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub artist: String,
    #[serde(default, deserialize_with = "nullable")]
    pub is_auto_queued: bool,
}

impl QueuedTrack {
    /// Whether this entry names the given track (titles compared case-insensitively).
    pub fn matches_title(&self, title: &str) -> bool {
        self.title.to_lowercase() == title.to_lowercase()
    }
}

/// A crossfade plan announced by the server.
///
/// Built from the wire payload by [`crate::msg::normalize_transition`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionPlan {
    pub song_a: String,
    pub song_b: String,
    pub exit_segment: String,
    pub entry_segment: String,
    pub score: f64,
    /// Crossfade length in seconds.
    pub crossfade_duration: f64,
    /// Offset into song A where the crossfade begins, in seconds.
    pub transition_start_time: f64,
    /// Offset into song B where it enters, in seconds.
    pub song_b_start_offset: f64,
}

impl Default for TransitionPlan {
    fn default() -> Self {
        Self {
            song_a: String::new(),
            song_b: String::new(),
            exit_segment: String::new(),
            entry_segment: String::new(),
            score: 0.0,
            crossfade_duration: 8.0,
            transition_start_time: 0.0,
            song_b_start_offset: 0.0,
        }
    }
}

/// Treats an explicit `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Metadata fields never fail a track_start: a mistyped value falls back to
// its default so the track still gets an id.

fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n: &f64| n.is_finite())
}

/// Strings as-is, numbers and booleans in their JSON text form, anything else empty.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        v @ (Value::Number(_) | Value::Bool(_)) => v.to_string(),
        _ => String::new(),
    })
}

/// JSON numbers or numeric strings; anything else is 0.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_value(&Value::deserialize(deserializer)?).unwrap_or_default())
}

/// A positive rate in Hz, rounded; anything else counts as undeclared.
fn lenient_rate<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_value(&Value::deserialize(deserializer)?)
        .filter(|rate| *rate >= 1.0 && *rate <= u32::MAX as f64)
        .map(|rate| rate.round() as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_metadata_tolerates_nulls_and_missing_fields() {
        let meta: TrackMetadata =
            serde_json::from_str(r#"{"title":"Strobe","artist":null,"bpm":128}"#).unwrap();
        assert_eq!(meta.title, "Strobe");
        assert_eq!(meta.artist, "");
        assert_eq!(meta.bpm, 128.0);
        assert_eq!(meta.sample_rate, None);
    }

    #[test]
    fn track_metadata_accepts_mistyped_numbers() {
        let meta: TrackMetadata = serde_json::from_str(
            r#"{"title":"Pulse","bpm":"128","duration":"215.5","sample_rate":44100.0,"key":5}"#,
        )
        .unwrap();
        assert_eq!(meta.bpm, 128.0);
        assert_eq!(meta.duration, 215.5);
        assert_eq!(meta.sample_rate, Some(44_100));
        assert_eq!(meta.key, "5");

        let meta: TrackMetadata =
            serde_json::from_str(r#"{"title":"Drift","bpm":[1],"sample_rate":"fast"}"#).unwrap();
        assert_eq!(meta.bpm, 0.0);
        assert_eq!(meta.sample_rate, None);

        let meta: TrackMetadata = serde_json::from_str(r#"{"sample_rate":-1}"#).unwrap();
        assert_eq!(meta.sample_rate, None);
    }

    #[test]
    fn queued_track_title_match_ignores_case() {
        let next = QueuedTrack {
            title: "Around The World".to_string(),
            ..Default::default()
        };
        assert!(next.matches_title("AROUND THE WORLD"));
        assert!(!next.matches_title("Around"));
    }
}
