//! Error types for mixstream.

use std::time::Duration;

use thiserror::Error;

/// Main error type for mixstream operations.
#[derive(Debug, Error)]
pub enum Error {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport did not open within the connect timeout.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// An outbound command was issued without an open connection.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A binary frame could not be decoded as PCM.
    #[error("decode error: {0}")]
    Decode(String),

    /// The audio output rejected a buffer or could not be opened.
    #[error("audio output error: {0}")]
    Output(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}
