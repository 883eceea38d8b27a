//! Connect to a mixing server, send a prompt and follow playback.
//!
//! Usage: mixstream [<endpoint-url> | <config.toml>] [prompt...]
//!
//! Run with debug: RUST_LOG=mixstream=debug cargo run -- ws://localhost:8000/api/ws/audio "deep house"
//! Build with `--features device` to play through the default sound card.

use std::fs;

use mixstream::{
    AudioOutput, ChannelCallbacks, ClientConfig, PlayerEvent, StreamClient,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize tracing from RUST_LOG env var
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(arg) if arg.ends_with(".toml") => load_config(&arg),
        Some(endpoint) => ClientConfig::new(endpoint),
        None => ClientConfig::default(),
    };
    let prompt: Vec<String> = args.collect();
    let prompt = prompt.join(" ");

    let output = match open_output() {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Failed to open audio output: {e}");
            std::process::exit(1);
        }
    };

    let (callbacks, mut events) = ChannelCallbacks::new();
    let client = StreamClient::spawn(config.clone(), output, Box::new(callbacks));

    println!("Connecting to {}...", config.endpoint);
    if let Err(e) = client.connect().await {
        eprintln!("Failed to connect: {e}");
        std::process::exit(1);
    }

    if !prompt.is_empty() {
        if let Err(e) = client.send_prompt(prompt.as_str()).await {
            eprintln!("Failed to send prompt: {e}");
            std::process::exit(1);
        }
        println!("Prompt sent: {prompt}");
    }
    println!("Listening... (Press Ctrl+C to exit)");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let done = event == PlayerEvent::QueueEmpty;
                print_event(&event);
                if done {
                    break;
                }
            }
            _ = signal::ctrl_c() => {
                println!();
                println!("Shutting down...");
                break;
            }
        }
    }

    client.shutdown().await;
}

fn load_config(path: &str) -> ClientConfig {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to read {path}: {e}");
            std::process::exit(1);
        }
    };
    match ClientConfig::from_toml_str(&contents) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to parse {path}: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "device")]
fn open_output() -> mixstream::Result<Box<dyn AudioOutput>> {
    Ok(Box::new(mixstream::DeviceOutput::open_default()?))
}

#[cfg(not(feature = "device"))]
fn open_output() -> mixstream::Result<Box<dyn AudioOutput>> {
    Ok(Box::new(mixstream::HeadlessOutput::new()))
}

fn print_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::TrackStarted(track) => {
            println!(
                "Now playing: {} - {} ({:.0} BPM, {})",
                track.title, track.artist, track.bpm, track.key
            );
        }
        PlayerEvent::TrackEnded => println!("Track ended"),
        PlayerEvent::QueueEmpty => println!("Queue empty, playback finished"),
        PlayerEvent::QueueUpdated(queue) => {
            println!("Queue ({} tracks):", queue.len());
            for (i, track) in queue.iter().enumerate() {
                let auto = if track.is_auto_queued { " [auto]" } else { "" };
                println!("  {}. {} - {}{auto}", i + 1, track.title, track.artist);
            }
        }
        PlayerEvent::Error(message) => eprintln!("Error: {message}"),
        PlayerEvent::TransitionPlanned(plan) => {
            println!(
                "Transition planned: {} -> {} (score {:.2}, {:.1}s crossfade)",
                plan.song_a, plan.song_b, plan.score, plan.crossfade_duration
            );
        }
        PlayerEvent::TransitionStarted(plan) => {
            println!("Crossfading into {}", plan.song_b);
        }
        PlayerEvent::TransitionCompleted { now_playing } => {
            println!("Crossfade rendered ({now_playing})");
        }
        PlayerEvent::QueuedNextUpdated(Some(next)) => {
            println!("Up next: {} - {}", next.title, next.artist);
        }
        PlayerEvent::QueuedNextUpdated(None) => {}
        PlayerEvent::ConnectionChanged(connected) => {
            println!("{}", if *connected { "Connected" } else { "Disconnected" });
        }
    }
}
