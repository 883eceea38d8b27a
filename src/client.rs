//! Connection management and the client task.
//!
//! [`StreamClient`] is a lightweight handle; the WebSocket, the [`Session`] and
//! both monitor timers live in a spawned runner task and are driven by one
//! `select!` loop, so session state never needs a lock.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::stream::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionWriter, Frame};
use crate::event::PlayerCallbacks;
use crate::msg::OutboundCommand;
use crate::output::AudioOutput;
use crate::session::{Session, SessionSnapshot};
use crate::{Error, Result};

// ============================================================================
// Reconnect policy
// ============================================================================

/// Bounded, fixed-delay reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay)
    }

    /// Attempts scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

// ============================================================================
// Actor Pattern: Commands and Handle
// ============================================================================

enum ClientCommand {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Send {
        command: OutboundCommand,
        reply: oneshot::Sender<Result<()>>,
    },
    SetCallbacks {
        callbacks: Box<dyn PlayerCallbacks>,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown,
}

/// Handle to a running playback client.
///
/// All methods talk to the runner task over a channel; they fail with
/// [`Error::ConnectionClosed`] only after [`StreamClient::shutdown`].
pub struct StreamClient {
    command_tx: mpsc::Sender<ClientCommand>,
    task: JoinHandle<()>,
}

impl StreamClient {
    /// Spawn the runner task. Does not connect; call [`StreamClient::connect`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: ClientConfig,
        output: Box<dyn AudioOutput>,
        callbacks: Box<dyn PlayerCallbacks>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);

        let mut session = Session::new(output, &config);
        session.set_callbacks(callbacks);

        let runner = ClientRunner {
            reconnect: ReconnectPolicy::new(
                config.max_reconnect_attempts,
                config.reconnect_delay(),
            ),
            config,
            session,
            link: None,
            reconnect_at: None,
            reconnecting: None,
            command_rx,
        };

        let task = tokio::spawn(async move {
            runner.run().await;
        });

        Self { command_tx, task }
    }

    /// Open the connection. Resolves immediately when already open.
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::Connect { reply }, rx).await?
    }

    /// Close the connection and reset all playback state. Always safe.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::Disconnect { reply }, rx).await?
    }

    /// Ask the server to generate music for `prompt`.
    pub async fn send_prompt(&self, prompt: impl Into<String>) -> Result<()> {
        self.send(OutboundCommand::Prompt {
            data: prompt.into(),
        })
        .await
    }

    /// Submit a new ordering of the upcoming-queue indices.
    pub async fn send_reorder(&self, new_order: Vec<usize>) -> Result<()> {
        self.send(OutboundCommand::ReorderQueue { new_order }).await
    }

    async fn send(&self, command: OutboundCommand) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::Send { command, reply }, rx)
            .await?
    }

    /// Replace the active callback set.
    pub async fn set_callbacks(&self, callbacks: Box<dyn PlayerCallbacks>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::SetCallbacks { callbacks, reply }, rx)
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::Snapshot { reply }, rx).await
    }

    /// Disconnect, stop the output and wait for the runner to exit.
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(ClientCommand::Shutdown).await;
        let _ = self.task.await;
    }

    async fn request<T>(&self, command: ClientCommand, rx: oneshot::Receiver<T>) -> Result<T> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// Client Runner (runs in spawned task)
// ============================================================================

type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;
type PendingConnect = Pin<Box<dyn Future<Output = Result<Connection>> + Send>>;

/// An open connection: inbound frames plus the write half.
struct Link {
    frames: FrameStream,
    writer: ConnectionWriter,
}

struct ClientRunner {
    config: ClientConfig,
    session: Session,
    link: Option<Link>,
    reconnect: ReconnectPolicy,
    /// When the next automatic reconnect attempt is due.
    reconnect_at: Option<Instant>,
    /// An automatic reconnect in flight; polled alongside commands.
    reconnecting: Option<PendingConnect>,
    command_rx: mpsc::Receiver<ClientCommand>,
}

impl ClientRunner {
    async fn run(mut self) {
        info!(endpoint = %self.config.endpoint, "Client runner starting");

        let mut transition_tick = tokio::time::interval(self.config.transition_poll());
        transition_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completion_tick = tokio::time::interval(self.config.completion_poll());
        completion_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = next_frame(&mut self.link) => {
                    match frame {
                        Some(Ok(frame)) => self.session.handle_frame(frame),
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            self.link_lost();
                        }
                        None => {
                            info!("WebSocket closed by server");
                            self.link_lost();
                        }
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ClientCommand::Connect { reply }) => {
                            let result = self.do_connect().await;
                            let _ = reply.send(result);
                        }
                        Some(ClientCommand::Disconnect { reply }) => {
                            self.do_disconnect().await;
                            let _ = reply.send(Ok(()));
                        }
                        Some(ClientCommand::Send { command, reply }) => {
                            let result = self.do_send(&command).await;
                            let _ = reply.send(result);
                        }
                        Some(ClientCommand::SetCallbacks { callbacks, reply }) => {
                            self.session.set_callbacks(callbacks);
                            let _ = reply.send(());
                        }
                        Some(ClientCommand::Snapshot { reply }) => {
                            let _ = reply.send(self.session.snapshot());
                        }
                        Some(ClientCommand::Shutdown) | None => {
                            info!("Client shutdown requested");
                            break;
                        }
                    }
                }

                _ = transition_tick.tick() => {
                    self.session.poll_transitions();
                }

                _ = completion_tick.tick() => {
                    self.session.poll_completion();
                }

                _ = reconnect_due(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.start_reconnect();
                }

                result = pending_connect(&mut self.reconnecting) => {
                    self.reconnecting = None;
                    match result {
                        Ok(connection) => self.install(connection),
                        Err(e) => {
                            warn!(error = %e, attempt = self.reconnect.attempts(), "Reconnect failed");
                            self.schedule_reconnect();
                        }
                    }
                }
            }
        }

        self.do_disconnect().await;
        info!("Client runner stopped");
    }

    async fn do_connect(&mut self) -> Result<()> {
        if self.link.is_some() {
            debug!("Already connected");
            return Ok(());
        }
        // An explicit connect supersedes any automatic retry.
        self.reconnecting = None;
        self.reconnect_at = None;
        let connection =
            Connection::connect(&self.config.endpoint, self.config.connect_timeout()).await?;
        self.install(connection);
        Ok(())
    }

    fn install(&mut self, connection: Connection) {
        let (reader, writer) = connection.split();
        self.link = Some(Link {
            frames: Box::pin(reader.into_stream()),
            writer,
        });
        self.reconnect.reset();
        self.reconnect_at = None;
        self.reconnecting = None;
        info!(endpoint = %self.config.endpoint, "Connected");
        self.session.set_connected(true);
    }

    async fn do_disconnect(&mut self) {
        self.reconnect_at = None;
        self.reconnecting = None;
        self.reconnect.reset();
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.writer.close().await {
                debug!(error = %e, "Close handshake failed");
            }
            info!("Disconnected");
        }
        self.session.reset();
        self.session.set_connected(false);
    }

    async fn do_send(&mut self, command: &OutboundCommand) -> Result<()> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        link.writer.send(command).await
    }

    /// The socket went away without a disconnect request.
    fn link_lost(&mut self) {
        self.link = None;
        self.session.reset();
        self.session.set_connected(false);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        match self.reconnect.next_delay() {
            Some(delay) => {
                info!(
                    attempt = self.reconnect.attempts(),
                    max = self.config.max_reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                warn!(
                    attempts = self.reconnect.attempts(),
                    "Reconnect attempts exhausted, staying disconnected"
                );
            }
        }
    }

    fn start_reconnect(&mut self) {
        if self.link.is_some() {
            return;
        }
        debug!(attempt = self.reconnect.attempts(), "Reconnecting");
        let endpoint = self.config.endpoint.clone();
        let timeout = self.config.connect_timeout();
        self.reconnecting = Some(Box::pin(async move {
            Connection::connect(&endpoint, timeout).await
        }));
    }
}

/// Next inbound frame, or never when there is no connection.
async fn next_frame(link: &mut Option<Link>) -> Option<Result<Frame>> {
    match link {
        Some(link) => link.frames.next().await,
        None => std::future::pending().await,
    }
}

/// Outcome of the in-flight reconnect, or never when none is running.
async fn pending_connect(pending: &mut Option<PendingConnect>) -> Result<Connection> {
    match pending {
        Some(connecting) => connecting.await,
        None => std::future::pending().await,
    }
}

async fn reconnect_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NoopCallbacks;
    use crate::output::ManualOutput;

    #[test]
    fn policy_stops_after_max_attempts() {
        let mut policy = ReconnectPolicy::new(5, Duration::from_secs(2));
        for _ in 0..5 {
            assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
        }
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.attempts(), 5);

        policy.reset();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn zero_attempts_never_retries() {
        let mut policy = ReconnectPolicy::new(0, Duration::from_secs(2));
        assert_eq!(policy.next_delay(), None);
    }

    #[tokio::test]
    async fn commands_without_connection() {
        let clock = ManualOutput::new();
        let client = StreamClient::spawn(
            ClientConfig::default(),
            Box::new(clock.clone()),
            Box::new(NoopCallbacks),
        );

        assert!(matches!(
            client.send_prompt("late night techno").await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            client.send_reorder(vec![1, 0]).await,
            Err(Error::NotConnected)
        ));

        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        let snapshot = client.snapshot().await.unwrap();
        assert!(!snapshot.flags.connected);
        assert_eq!(snapshot.registered_tracks, 0);
        assert_eq!(snapshot.next_commit_time, 0.0);
        assert_eq!(clock.stop_count(), 2);

        client.shutdown().await;
    }
}
