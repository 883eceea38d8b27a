//! Classify a captured WebSocket frame and print what the client would see.
//!
//! Usage: cargo run --bin inspect <frame-file> [sample-rate]
//!
//! Text frames are parsed as control messages; anything else is decoded as
//! interleaved 16-bit stereo PCM.

use std::fs;

use mixstream::config::DEFAULT_SAMPLE_RATE;
use mixstream::msg::{self, ControlMessage};
use mixstream::pcm;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <frame-file> [sample-rate]", args[0]);
        std::process::exit(1);
    }

    let data = match fs::read(&args[1]) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", args[1]);
            std::process::exit(1);
        }
    };
    let sample_rate = match args.get(2).map(|s| s.parse::<u32>()) {
        None => DEFAULT_SAMPLE_RATE,
        Some(Ok(rate)) => rate,
        Some(Err(e)) => {
            eprintln!("Invalid sample rate {}: {e}", args[2]);
            std::process::exit(1);
        }
    };

    println!("Frame: {} bytes", data.len());
    println!();

    match control_text(&data) {
        Some(text) => inspect_control(text),
        None => inspect_pcm(&data, sample_rate),
    }
}

/// Frames that are valid UTF-8 and look like a JSON object are control frames.
fn control_text(data: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(data).ok()?;
    text.trim_start().starts_with('{').then_some(text)
}

fn inspect_control(text: &str) {
    println!("Kind: control");
    match msg::parse_control(text) {
        Ok(ControlMessage::TransitionPlanned { transition, next_track }) => {
            println!("Type: transition_planned");
            println!("Plan: {:#?}", msg::normalize_transition(&transition));
            if let Some(next) = next_track {
                println!("Next: {} - {}", next.title, next.artist);
            }
        }
        Ok(ControlMessage::TransitionStart { transition }) => {
            println!("Type: transition_start");
            println!("Plan: {:#?}", msg::normalize_transition(&transition));
        }
        Ok(message) => {
            println!("Type: {}", message.kind());
            println!("{message:#?}");
        }
        Err(e) => {
            println!("Malformed: {e}");
        }
    }
}

fn inspect_pcm(data: &[u8], sample_rate: u32) {
    println!("Kind: audio");
    match pcm::decode_pcm(data, sample_rate) {
        Ok(buffer) => {
            let trailing = data.len() % pcm::BYTES_PER_FRAME;
            println!("Sample rate: {sample_rate} Hz");
            println!("Frames: {}", buffer.frames());
            println!("Duration: {:.3}s", buffer.duration());
            println!("Peak: {:.4}", buffer.peak());
            if trailing > 0 {
                println!("Trailing bytes dropped: {trailing}");
            }
        }
        Err(e) => {
            println!("Undecodable: {e}");
        }
    }
}
