//! Room server protocol client.
//!
//! Owns at most one WebSocket connection at a time, drives the handshake and
//! runs a background read loop that routes decoded events to handlers.
//!
//! # Handshake
//!
//! ```text
//!   Disconnected
//!        │ ws connect
//!        ▼
//!   AwaitingGreeting ── RoomInfo ──┐
//!                                  │ (catalog enabled) send GetDataPackage
//!                                  ▼
//!                          AwaitingCatalog ── DataPackage ── dispatch
//!                                  │
//!                        dispatch RoomInfo, send Connect
//!                                  ▼
//!                     AwaitingHandshakeReply
//!                       │                 │
//!                  Connected       ConnectionRefused
//!                       │                 │
//!               dispatch, spawn        Failed
//!                  read loop
//!                       ▼
//!                   Connected
//! ```
//!
//! Every handshake read expects exactly one event in its frame and is bounded
//! by [`ClientSettings::handshake_timeout`]. Anything else fails the attempt.
//!
//! # Concurrency
//!
//! [`ProtocolClient::connect`] holds the connection slot for its whole run,
//! so concurrent calls are serialized. A previous connection is closed and its
//! read loop awaited before the next handshake starts; at most one read loop
//! ever dispatches. Handlers run sequentially in wire order. A handler must
//! not await `connect` itself: the new connection waits for the read loop
//! that is running that handler.

// Rust guideline compliant 2026-02

mod handlers;

pub use handlers::{HandlerFuture, HandlerRegistry};

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::logging::LogContext;
use crate::protocol::{self, ClientCommand, ConnectRequest, EventKind, ServerEvent};
use crate::ws::{self, Incoming, WsReader, WsWriter};

/// Default bound on each handshake read.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long teardown waits for the old read loop after sending close.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Connection identity and handshake options.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Game sent in `Connect`.
    pub game: String,
    /// Slot name sent in `Connect`.
    pub slot_name: String,
    /// Request catalogs before connecting.
    pub fetch_catalog: bool,
    /// Bound on each handshake read.
    pub handshake_timeout: Duration,
}

impl ClientSettings {
    /// Settings with catalog fetching off and the default timeout.
    pub fn new(game: impl Into<String>, slot_name: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            slot_name: slot_name.into(),
            fetch_catalog: false,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Enable or disable the catalog request.
    pub fn with_catalog(mut self, fetch_catalog: bool) -> Self {
        self.fetch_catalog = fetch_catalog;
        self
    }

    /// Override the handshake read bound.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Connection state of a [`ProtocolClient`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Socket open, waiting for `RoomInfo`.
    AwaitingGreeting,
    /// Catalog requested, waiting for `DataPackage`.
    AwaitingCatalog,
    /// `Connect` sent, waiting for the verdict.
    AwaitingHandshakeReply,
    /// Handshake done, read loop running.
    Connected,
    /// Last attempt failed.
    Failed(String),
}

/// Errors surfaced by [`ProtocolClient::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Socket could not be opened or written.
    Transport(String),
    /// Handshake received an unexpected message shape or kind.
    Protocol(String),
    /// Server refused the connection; reasons are verbatim.
    Rejected(Vec<String>),
    /// A handshake step did not complete in time.
    Timeout {
        /// Step that timed out.
        step: &'static str,
        /// Bound that was exceeded.
        after: Duration,
    },
    /// Server closed the socket mid-handshake.
    Closed,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::Rejected(reasons) => {
                write!(f, "Connection refused by server: {}", reasons.join(", "))
            }
            Self::Timeout { step, after } => {
                write!(f, "Timed out after {}s waiting for {step}", after.as_secs_f32())
            }
            Self::Closed => write!(f, "Connection closed by server during handshake"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Live connection owned by the client.
struct ActiveConnection {
    url: String,
    writer: WsWriter,
    read_loop: JoinHandle<()>,
}

/// Room server client. See the module docs for the lifecycle.
pub struct ProtocolClient {
    settings: ClientSettings,
    handlers: Arc<HandlerRegistry>,
    state: Arc<Mutex<ConnectionState>>,
    connection: tokio::sync::Mutex<Option<ActiveConnection>>,
    log: LogContext,
}

impl fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl ProtocolClient {
    /// Create a disconnected client.
    pub fn new(settings: ClientSettings, log: LogContext) -> Self {
        Self {
            settings,
            handlers: Arc::new(HandlerRegistry::default()),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            connection: tokio::sync::Mutex::new(None),
            log,
        }
    }

    /// Settings this client connects with.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Register an additional handler for `kind`.
    ///
    /// Handlers for one kind run in registration order. Registration is
    /// permanent and takes effect from the next dispatched event.
    pub fn add_handler<F, Fut>(&self, kind: EventKind, handler: F)
    where
        F: Fn(Arc<ServerEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers.add(kind, handler);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the handshake completed and the read loop is still running.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn set_state(&self, state: ConnectionState) {
        set_state(&self.state, state);
    }

    /// Connect to `url`, replacing any existing connection.
    ///
    /// Returns once the handshake completed and the read loop is running.
    /// Subscribers have already seen `DataPackage` (if requested), `RoomInfo`
    /// and `Connected`, in that order. On failure the client is left
    /// disconnected and `connect` may be called again.
    pub async fn connect(&self, url: &str) -> Result<(), ClientError> {
        let mut slot = self.connection.lock().await;

        if let Some(previous) = slot.take() {
            self.teardown(previous).await;
        }

        self.set_state(ConnectionState::AwaitingGreeting);
        match self.establish(url).await {
            Ok(active) => {
                *slot = Some(active);
                log::info!(
                    target: self.log.target(),
                    "Established socket connection to '{}' for slot '{}'",
                    url,
                    self.settings.slot_name
                );
                Ok(())
            }
            Err(e) => {
                log::warn!(target: self.log.target(), "Connection to '{}' failed: {}", url, e);
                self.set_state(ConnectionState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Close the current connection, if any, and wait for its read loop.
    pub async fn disconnect(&self) {
        let mut slot = self.connection.lock().await;
        if let Some(previous) = slot.take() {
            self.teardown(previous).await;
        }
    }

    async fn teardown(&self, mut previous: ActiveConnection) {
        log::info!(
            target: self.log.target(),
            "Closing existing socket connection to '{}' for slot '{}'",
            previous.url,
            self.settings.slot_name
        );

        if let Err(e) = previous.writer.close().await {
            log::debug!(target: self.log.target(), "Close handshake failed: {:#}", e);
        }

        let mut read_loop = previous.read_loop;
        if tokio::time::timeout(CLOSE_GRACE, &mut read_loop).await.is_err() {
            log::warn!(
                target: self.log.target(),
                "Read loop did not exit within {}s of close, aborting it",
                CLOSE_GRACE.as_secs()
            );
            read_loop.abort();
            let _ = read_loop.await;
        }

        self.set_state(ConnectionState::Disconnected);
    }

    async fn establish(&self, url: &str) -> Result<ActiveConnection, ClientError> {
        let (mut writer, mut reader) = ws::connect(url)
            .await
            .map_err(|e| ClientError::Transport(format!("{e:#}")))?;

        if let Err(e) = self.handshake(url, &mut writer, &mut reader).await {
            let _ = writer.close().await;
            return Err(e);
        }

        self.set_state(ConnectionState::Connected);
        let read_loop = tokio::spawn(run_read_loop(
            reader,
            Arc::clone(&self.handlers),
            Arc::clone(&self.state),
            self.log.clone(),
        ));

        Ok(ActiveConnection {
            url: url.to_string(),
            writer,
            read_loop,
        })
    }

    async fn handshake(
        &self,
        url: &str,
        writer: &mut WsWriter,
        reader: &mut WsReader,
    ) -> Result<(), ClientError> {
        let greeting = self.read_single(reader, "RoomInfo").await?;
        let ServerEvent::RoomInfo(room_info) = &greeting else {
            return Err(unexpected("RoomInfo", &greeting));
        };

        if self.settings.fetch_catalog {
            self.set_state(ConnectionState::AwaitingCatalog);
            log::info!(
                target: self.log.target(),
                "Requesting data package for {} game(s) from '{}'",
                room_info.games.len(),
                url
            );
            let request = ClientCommand::GetDataPackage {
                games: room_info.games.clone(),
            };
            self.send(writer, &request).await?;

            let catalog = self.read_single(reader, "DataPackage").await?;
            if catalog.kind() != EventKind::DataPackage {
                return Err(unexpected("DataPackage", &catalog));
            }
            self.handlers.dispatch(catalog, &self.log).await;
        }

        self.handlers.dispatch(greeting, &self.log).await;

        self.set_state(ConnectionState::AwaitingHandshakeReply);
        log::info!(
            target: self.log.target(),
            "Sending connect message to server at '{}' for slot '{}'",
            url,
            self.settings.slot_name
        );
        let connect = ClientCommand::Connect(ConnectRequest::tracker(
            &self.settings.game,
            &self.settings.slot_name,
        ));
        self.send(writer, &connect).await?;

        let reply = self
            .read_single(reader, "Connected or ConnectionRefused")
            .await?;
        match reply {
            ServerEvent::Connected(_) => {
                log::info!(
                    target: self.log.target(),
                    "Successfully connected to websocket server for slot '{}'",
                    self.settings.slot_name
                );
                self.handlers.dispatch(reply, &self.log).await;
                Ok(())
            }
            ServerEvent::ConnectionRefused(refused) => Err(ClientError::Rejected(refused.errors)),
            other => Err(unexpected("Connected or ConnectionRefused", &other)),
        }
    }

    async fn send(&self, writer: &mut WsWriter, command: &ClientCommand) -> Result<(), ClientError> {
        let text = protocol::encode(command).map_err(|e| {
            ClientError::Protocol(format!("failed to encode {}: {e}", command.tag()))
        })?;
        log::debug!(target: self.log.target(), "Sending {}: {}", command.tag(), text);
        writer
            .send_text(&text)
            .await
            .map_err(|e| ClientError::Transport(format!("{e:#}")))
    }

    /// Read one frame within the handshake bound and require exactly one
    /// event in it.
    async fn read_single(
        &self,
        reader: &mut WsReader,
        step: &'static str,
    ) -> Result<ServerEvent, ClientError> {
        let after = self.settings.handshake_timeout;
        let text = tokio::time::timeout(after, read_frame(reader))
            .await
            .map_err(|_elapsed| ClientError::Timeout { step, after })??;

        log::debug!(target: self.log.target(), "Received handshake frame: {}", text);
        let mut events: Vec<ServerEvent> = protocol::decode(&text)
            .map_err(|e| ClientError::Protocol(format!("invalid frame while waiting for {step}: {e}")))?
            .collect();

        if events.len() != 1 {
            return Err(ClientError::Protocol(format!(
                "expected exactly one message while waiting for {step}, got {}",
                events.len()
            )));
        }
        Ok(events.remove(0))
    }
}

impl Drop for ProtocolClient {
    fn drop(&mut self) {
        if let Some(active) = self.connection.get_mut().take() {
            active.read_loop.abort();
        }
    }
}

fn unexpected(expected: &str, got: &ServerEvent) -> ClientError {
    ClientError::Protocol(format!("expected {expected}, got {}", got.kind()))
}

fn set_state(state: &Mutex<ConnectionState>, next: ConnectionState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

/// Next text frame during the handshake.
async fn read_frame(reader: &mut WsReader) -> Result<String, ClientError> {
    match reader.recv().await {
        Some(Ok(Incoming::Text(text))) => Ok(text),
        Some(Ok(Incoming::Closed { .. })) | None => Err(ClientError::Closed),
        Some(Err(e)) => Err(ClientError::Transport(format!("{e:#}"))),
    }
}

/// Background loop for one connection: decode every frame and dispatch its
/// events in order until the socket closes or errors.
async fn run_read_loop(
    mut reader: WsReader,
    handlers: Arc<HandlerRegistry>,
    state: Arc<Mutex<ConnectionState>>,
    log: LogContext,
) {
    loop {
        let text = match reader.recv().await {
            Some(Ok(Incoming::Text(text))) => text,
            Some(Ok(Incoming::Closed { code, reason })) => {
                // Keep reading so the close reply is flushed; the stream ends next.
                log::info!(target: log.target(), "Server closed connection ({}): {}", code, reason);
                continue;
            }
            Some(Err(e)) => {
                log::warn!(target: log.target(), "Socket read failed: {:#}", e);
                break;
            }
            None => {
                log::info!(target: log.target(), "Socket stream ended");
                break;
            }
        };

        log::debug!(target: log.target(), "Received socket message: {}", text);
        let events = match protocol::decode(&text) {
            Ok(events) => events,
            Err(e) => {
                log::error!(target: log.target(), "Dropping undecodable frame: {}", e);
                continue;
            }
        };

        for event in events {
            handlers.dispatch(event, &log).await;
        }
    }

    set_state(&state, ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_error_joins_reasons() {
        let err = ClientError::Rejected(vec!["InvalidSlot".to_string(), "InvalidGame".to_string()]);
        assert_eq!(
            err.to_string(),
            "Connection refused by server: InvalidSlot, InvalidGame"
        );
    }

    #[test]
    fn test_settings_builder() {
        let settings = ClientSettings::new("Archipelago", "Watcher")
            .with_catalog(true)
            .with_handshake_timeout(Duration::from_millis(250));
        assert!(settings.fetch_catalog);
        assert_eq!(settings.handshake_timeout, Duration::from_millis(250));
        assert_eq!(settings.slot_name, "Watcher");
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_host_fails_with_transport_error() {
        let client = ProtocolClient::new(
            ClientSettings::new("Archipelago", "Watcher"),
            LogContext::new("test"),
        );
        let err = client.connect("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(matches!(client.state(), ConnectionState::Failed(_)));
    }
}
