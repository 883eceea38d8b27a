//! # mixstream
//!
//! Playback client for a server that live-mixes music and streams it as raw
//! PCM over a WebSocket, interleaved with JSON control messages.
//!
//! The client schedules audio gaplessly on the output's clock and reports
//! track changes only when they become audible, not when their bytes arrive.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mixstream::{ChannelCallbacks, ClientConfig, HeadlessOutput, PlayerEvent, StreamClient};
//!
//! #[tokio::main]
//! async fn main() -> mixstream::Result<()> {
//!     let (callbacks, mut events) = ChannelCallbacks::new();
//!     let client = StreamClient::spawn(
//!         ClientConfig::default(),
//!         Box::new(HeadlessOutput::new()),
//!         Box::new(callbacks),
//!     );
//!     client.connect().await?;
//!     client.send_prompt("warm deep house").await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             PlayerEvent::TrackStarted(track) => println!("Now playing {}", track.title),
//!             PlayerEvent::QueueEmpty => break,
//!             _ => {}
//!         }
//!     }
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod msg;
pub mod output;
pub mod pcm;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod types;

pub(crate) mod connection;

pub use client::{ReconnectPolicy, StreamClient};
pub use config::ClientConfig;
pub use connection::Frame;
pub use event::{ChannelCallbacks, NoopCallbacks, PlayerCallbacks, PlayerEvent};
pub use msg::{ControlMessage, OutboundCommand};
pub use output::{AudioOutput, HeadlessOutput, ManualOutput};
#[cfg(feature = "device")]
pub use output::DeviceOutput;
pub use session::{PlanState, Session, SessionFlags, SessionSnapshot};

pub use error::Error;
pub use types::*;

/// Result type for mixstream operations.
pub type Result<T> = std::result::Result<T, Error>;
