//! End-to-end session behavior on a hand-driven clock.

use mixstream::pcm::BYTES_PER_FRAME;
use mixstream::{ChannelCallbacks, ClientConfig, ManualOutput, PlayerEvent, Session};
use tokio::sync::mpsc::UnboundedReceiver;

const RATE: u32 = 8_000;
const STEP: f64 = 0.01;

fn track_start(title: &str) -> String {
    format!(
        r#"{{"type":"track_start","track":{{"title":"{title}","artist":"Mixer",
            "bpm":124,"key":"Am","duration":1.5,"sample_rate":{RATE}}}}}"#
    )
}

fn chunk(seconds: f64) -> Vec<u8> {
    vec![0u8; (seconds * RATE as f64) as usize * BYTES_PER_FRAME]
}

/// Step the clock to `until`, polling both monitors at every step and
/// recording each event with the clock time it was observed at.
fn run_until(
    session: &mut Session,
    clock: &ManualOutput,
    events: &mut UnboundedReceiver<PlayerEvent>,
    until: f64,
    log: &mut Vec<(f64, PlayerEvent)>,
) {
    loop {
        session.poll_transitions();
        session.poll_completion();
        let now = session.clock();
        while let Ok(event) = events.try_recv() {
            log.push((now, event));
        }
        if now >= until {
            break;
        }
        clock.advance(STEP);
    }
}

fn setup() -> (Session, ManualOutput, UnboundedReceiver<PlayerEvent>) {
    let clock = ManualOutput::new();
    let mut session = Session::new(Box::new(clock.clone()), &ClientConfig::default());
    let (callbacks, events) = ChannelCallbacks::new();
    session.set_callbacks(Box::new(callbacks));
    (session, clock, events)
}

#[test]
fn two_track_scenario_fires_in_clock_order() {
    let (mut session, clock, mut events) = setup();

    session.handle_text(&track_start("A"));
    for _ in 0..3 {
        session.handle_binary(&chunk(0.5));
    }
    session.handle_text(&track_start("B"));
    session.handle_binary(&chunk(0.5));
    session.handle_text(r#"{"type":"track_end"}"#);
    session.handle_text(r#"{"type":"queue_empty"}"#);

    let starts: Vec<f64> = clock.commits().iter().map(|c| c.start).collect();
    assert_eq!(starts, vec![0.0, 0.5, 1.0, 1.5]);

    let mut log = Vec::new();
    run_until(&mut session, &clock, &mut events, 2.5, &mut log);

    let started: Vec<(f64, String)> = log
        .iter()
        .filter_map(|(t, e)| match e {
            PlayerEvent::TrackStarted(track) => Some((*t, track.title.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(started.len(), 2);
    assert_eq!(started[0].1, "A");
    assert!(started[0].0 < 0.02);
    assert_eq!(started[1].1, "B");
    assert!((started[1].0 - 1.5).abs() <= 0.02 + STEP);

    let empties: Vec<f64> = log
        .iter()
        .filter(|(_, e)| *e == PlayerEvent::QueueEmpty)
        .map(|(t, _)| *t)
        .collect();
    assert_eq!(empties.len(), 1);
    assert!(empties[0] >= 2.0);
    assert!(empties[0] > started[1].0);

    let order: Vec<&PlayerEvent> = log.iter().map(|(_, e)| e).collect();
    let ended = order
        .iter()
        .position(|e| **e == PlayerEvent::TrackEnded)
        .unwrap();
    let empty = order
        .iter()
        .position(|e| **e == PlayerEvent::QueueEmpty)
        .unwrap();
    assert_eq!(empty, ended + 1);
    assert!(session.flags().streaming_complete);
}

#[test]
fn late_audio_after_underrun_still_starts_on_clock() {
    let (mut session, clock, mut events) = setup();
    let mut log = Vec::new();

    session.handle_text(&track_start("A"));
    session.handle_binary(&chunk(0.5));
    run_until(&mut session, &clock, &mut events, 1.0, &mut log);

    // The buffer ran dry at 0.5; B's audio arrives later and plays immediately.
    session.handle_text(&track_start("B"));
    session.handle_binary(&chunk(0.5));
    assert_eq!(clock.commits().last().unwrap().start, session.clock());
    run_until(&mut session, &clock, &mut events, 1.1, &mut log);

    let titles: Vec<&str> = log
        .iter()
        .filter_map(|(_, e)| match e {
            PlayerEvent::TrackStarted(track) => Some(track.title.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(titles, vec!["A", "B"]);
}

#[test]
fn crossfade_lifecycle_with_look_ahead_track() {
    let (mut session, clock, mut events) = setup();
    let mut log = Vec::new();

    session.handle_text(&track_start("A"));
    session.handle_binary(&chunk(1.0));
    run_until(&mut session, &clock, &mut events, 0.0, &mut log);
    session.handle_text(
        r#"{"type":"transition_planned","transition":{"songA":"A","songB":"B",
            "crossfadeDuration":"4.5","transitionStartTime":30},
            "next_track":{"title":"B","artist":"Mixer"}}"#,
    );
    session.handle_text(r#"{"type":"transition_start","transition":null}"#);
    session.handle_text(&track_start("B"));
    session.handle_binary(&chunk(1.0));
    session.handle_text(r#"{"type":"transition_complete","now_playing":{"title":"B"}}"#);

    run_until(&mut session, &clock, &mut events, 0.5, &mut log);
    assert!(session.flags().transitioning);
    let plan = session.plan().unwrap();
    assert_eq!(plan.crossfade_duration, 4.5);
    assert_eq!(plan.transition_start_time, 30.0);
    assert_eq!(session.queued_next().unwrap().title, "B");

    run_until(&mut session, &clock, &mut events, 1.05, &mut log);
    assert!(!session.flags().transitioning);
    assert!(session.plan().is_none());
    assert!(session.queued_next().is_none());
    assert_eq!(session.current_track().unwrap().title, "B");
}
