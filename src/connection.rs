//! WebSocket link to the mixing server.
//!
//! Provides split reader/writer for concurrent use:
//! - `ConnectionReader` yields inbound [`Frame`]s via async stream
//! - `ConnectionWriter` sends [`OutboundCommand`]s as text frames

use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream, Stream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{
        client::IntoClientRequest,
        protocol::{Message as WsMessage, WebSocketConfig},
    },
};
use tracing::{debug, trace};

use crate::msg::OutboundCommand;
use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One inbound message, classified by wire type.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A JSON control message.
    Control(String),
    /// Raw interleaved PCM.
    Audio(Bytes),
}

// ============================================================================
// Connection (connection setup)
// ============================================================================

/// An open WebSocket to the audio endpoint.
///
/// Use `connect()` to open it, then `split()` for concurrent read and write.
pub struct Connection {
    ws: WsStream,
}

impl Connection {
    /// Open the socket, giving up after `timeout`.
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self> {
        debug!(endpoint, "Connecting to WebSocket");

        let request = endpoint
            .into_client_request()
            .map_err(|e| Error::Protocol(format!("invalid endpoint URL: {e}")))?;

        let config = WebSocketConfig::default();
        let (ws, response) =
            tokio::time::timeout(timeout, connect_async_with_config(request, Some(config), true))
                .await
                .map_err(|_| Error::ConnectTimeout(timeout))?
                .map_err(Box::new)?;

        debug!(status = ?response.status(), "WebSocket connected");
        trace!(headers = ?response.headers(), "Response headers");

        Ok(Self { ws })
    }

    /// Split into reader and writer for concurrent use.
    pub fn split(self) -> (ConnectionReader, ConnectionWriter) {
        let (sink, stream) = self.ws.split();
        (ConnectionReader { ws: stream }, ConnectionWriter { ws: sink })
    }
}

// ============================================================================
// ConnectionReader
// ============================================================================

/// Reader half of a split connection.
pub struct ConnectionReader {
    ws: SplitStream<WsStream>,
}

impl ConnectionReader {
    /// Convert into an async stream of frames.
    ///
    /// The stream ends when the server sends Close or the socket goes away.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Frame>> {
        async_stream::try_stream! {
            while let Some(msg) = self.ws.next().await {
                let msg = msg.map_err(Box::new)?;
                if matches!(msg, WsMessage::Close(_)) {
                    debug!("RX: Close");
                    break;
                }
                if let Some(frame) = classify(msg) {
                    yield frame;
                }
            }
        }
    }
}

/// Map a WebSocket message to a [`Frame`]; control-plane messages yield `None`.
fn classify(msg: WsMessage) -> Option<Frame> {
    match msg {
        WsMessage::Text(text) => {
            trace!(len = text.len(), "RX: Text");
            Some(Frame::Control(text))
        }
        WsMessage::Binary(data) => {
            trace!(len = data.len(), "RX: Binary");
            Some(Frame::Audio(Bytes::from(data)))
        }
        WsMessage::Ping(_) => {
            // tungstenite queues the pong itself
            trace!("RX: Ping (auto-pong)");
            None
        }
        WsMessage::Pong(_) => {
            trace!("RX: Pong");
            None
        }
        WsMessage::Close(_) => None,
        WsMessage::Frame(frame) => {
            trace!(?frame, "RX: Raw frame");
            None
        }
    }
}

// ============================================================================
// ConnectionWriter
// ============================================================================

/// Writer half of a split connection.
pub struct ConnectionWriter {
    ws: SplitSink<WsStream, WsMessage>,
}

impl ConnectionWriter {
    pub async fn send(&mut self, command: &OutboundCommand) -> Result<()> {
        let json = command.to_json()?;
        debug!(payload = %json, "TX: Command");
        self.ws
            .send(WsMessage::Text(json))
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Gracefully close the WebSocket connection.
    pub async fn close(&mut self) -> Result<()> {
        debug!("Closing WebSocket connection");
        self.ws.close().await.map_err(Box::new)?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
