//! Low-level room websocket client and outbound action sender.
//!
//! The client owns the connection lifecycle: it sends `join` on every open,
//! forwards inbound relay messages, and reconnects with capped exponential
//! backoff after an unintended close. Outbound actions are gated on the
//! `open` state; the relay protocol is last-write-wins broadcast, so actions
//! attempted while disconnected are dropped rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backoff::ReconnectPolicy;
use crate::room::proto::{ClientMessage, Language, ServerMessage};

/// Production backend base URL.
pub const BACKEND_BASE_URL: &str = "https://collaborative-code-editor-1-darj.onrender.com";
/// Local development backend base URL.
pub const LOCAL_BACKEND_BASE_URL: &str = "http://localhost:8000";
/// Environment variable overriding the backend base URL.
pub const BACKEND_URL_ENV: &str = "CODESYNC_BACKEND_URL";

const ROOM_ID_LEN: usize = 7;

/// Generates a short random room id, for the "create and join" flow.
pub fn generate_room_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ROOM_ID_LEN);
    id
}

/// Entry point for creating room connections.
#[derive(Clone, Debug, Default)]
pub struct RoomClient {
    local: bool,
    base_url_override: Option<String>,
    reconnect: ReconnectPolicy,
}

impl RoomClient {
    /// Creates a room client for the production backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a room client honoring the `CODESYNC_BACKEND_URL` environment
    /// variable when set.
    pub fn from_env() -> Self {
        let mut client = Self::new();
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                client = client.with_base_url(url);
            }
        }
        client
    }

    /// Enables or disables local mode endpoint routing.
    pub fn with_local_mode(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    /// Sets an explicit backend base URL override.
    ///
    /// The override takes precedence over local mode when set.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url_override = Some(base_url.trim().to_string());
        self
    }

    /// Replaces the reconnect schedule.
    pub fn with_reconnect_policy(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    fn base_url(&self) -> &str {
        if let Some(base_url) = self.base_url_override.as_deref() {
            return base_url;
        }
        if self.local {
            LOCAL_BACKEND_BASE_URL
        } else {
            BACKEND_BASE_URL
        }
    }

    /// Websocket URL for a room, derived from the backend base URL.
    pub fn room_url(&self, room_id: &str) -> String {
        format!("{}/ws/code/{}/", ws_base(self.base_url()), room_id)
    }

    /// Opens a connection to a room and joins it as `identity`.
    ///
    /// This spawns a background worker that exclusively owns the websocket
    /// and the reconnect timer, and returns a handle pair for sending
    /// actions and receiving relay messages. A session has at most one
    /// active connection; the returned handle is that connection.
    pub async fn connect(
        &self,
        room_id: &str,
        identity: &str,
    ) -> Result<RoomConnection, RoomClientError> {
        if room_id.trim().is_empty() {
            return Err(RoomClientError::Protocol(
                "room id must not be empty".to_string(),
            ));
        }
        if identity.trim().is_empty() {
            return Err(RoomClientError::Protocol(
                "identity must not be empty".to_string(),
            ));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let url = self.room_url(room_id);
        let identity = identity.to_string();
        let reconnect = self.reconnect;
        let open = Arc::new(AtomicBool::new(false));
        let worker_open = Arc::clone(&open);

        tokio::spawn(async move {
            room_connection_worker(
                url,
                identity,
                reconnect,
                outbound_rx,
                inbound_tx,
                status_tx,
                ready_tx,
                worker_open,
            )
            .await;
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(RoomConnection {
                sender: RoomSender {
                    tx: outbound_tx,
                    open,
                },
                receiver: inbound_rx,
                status: status_rx,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(RoomClientError::Protocol(
                "room worker stopped before initial connect".to_string(),
            )),
        }
    }
}

fn ws_base(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if trimmed.starts_with("wss://") || trimmed.starts_with("ws://") {
        trimmed.to_string()
    } else {
        format!("wss://{trimmed}")
    }
}

/// Connection lifecycle updates produced by the room worker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Active room connection channels.
///
/// Internally, messages are produced by the background websocket worker.
#[derive(Debug)]
pub struct RoomConnection {
    sender: RoomSender,
    receiver: mpsc::UnboundedReceiver<ServerMessage>,
    status: mpsc::UnboundedReceiver<ConnectionStatus>,
}

impl RoomConnection {
    /// Returns a cloneable sender for outbound room actions.
    pub fn sender(&self) -> RoomSender {
        self.sender.clone()
    }

    /// Splits into sender and raw inbound message receiver.
    pub fn split(self) -> (RoomSender, mpsc::UnboundedReceiver<ServerMessage>) {
        (self.sender, self.receiver)
    }

    /// Splits into sender, raw inbound message receiver, and connection
    /// status receiver.
    pub fn split_with_status(
        self,
    ) -> (
        RoomSender,
        mpsc::UnboundedReceiver<ServerMessage>,
        mpsc::UnboundedReceiver<ConnectionStatus>,
    ) {
        (self.sender, self.receiver, self.status)
    }

    /// Receives the next relay message from the room worker.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.receiver.recv().await
    }

    /// Receives the next connection status transition.
    pub async fn recv_status(&mut self) -> Option<ConnectionStatus> {
        self.status.recv().await
    }

    /// Leaves the room.
    ///
    /// Closes the socket and cancels any pending reconnect. Consumes the
    /// connection; no further callbacks touch the handles after this.
    pub fn leave(self) {
        let _ = self.sender.tx.send(WorkerCommand::Leave);
    }
}

enum WorkerCommand {
    Send(ClientMessage),
    Leave,
}

/// Cloneable sender for outbound room actions.
///
/// All sends are gated on the connection being `open`. While disconnected,
/// edits and clears are dropped silently (the reconnect resyncs state via
/// `init`); `compile` reports the failure so the caller can warn the user.
#[derive(Clone, Debug)]
pub struct RoomSender {
    tx: mpsc::UnboundedSender<WorkerCommand>,
    open: Arc<AtomicBool>,
}

impl RoomSender {
    /// Whether the connection is currently open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Broadcasts a local edit.
    pub fn code_update(&self, code: &str, language: Language, user: &str) {
        self.send_if_open(ClientMessage::CodeUpdate {
            code: code.to_string(),
            language,
            user: user.to_string(),
        });
    }

    /// Broadcasts a language switch, carrying the new template.
    pub fn language_change(&self, language: Language, code: &str, user: &str) {
        self.send_if_open(ClientMessage::LanguageChange {
            language,
            code: code.to_string(),
            user: user.to_string(),
        });
    }

    /// Requests execution of the given code.
    ///
    /// Unlike the fire-and-forget edit actions, this fails with
    /// [`RoomClientError::NotConnected`] while the connection is not open.
    pub fn compile(
        &self,
        code: &str,
        language: Language,
        user: &str,
    ) -> Result<(), RoomClientError> {
        if !self.is_open() {
            return Err(RoomClientError::NotConnected);
        }
        self.tx
            .send(WorkerCommand::Send(ClientMessage::Compile {
                code: code.to_string(),
                language,
                user: user.to_string(),
            }))
            .map_err(|_| RoomClientError::SendQueueClosed)
    }

    /// Broadcasts an output clear.
    pub fn clear_output(&self, user: &str) {
        self.send_if_open(ClientMessage::ClearOutput {
            user: user.to_string(),
        });
    }

    fn send_if_open(&self, message: ClientMessage) {
        if !self.is_open() {
            debug!(event = "room_action_dropped", reason = "not_connected");
            return;
        }
        if self.tx.send(WorkerCommand::Send(message)).is_err() {
            debug!(event = "room_action_dropped", reason = "worker_gone");
        }
    }
}

/// Errors produced by room transport and protocol handling.
#[derive(Debug, Error)]
pub enum RoomClientError {
    /// Websocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Action requires an open connection.
    #[error("not connected to the room relay")]
    NotConnected,

    /// Outbound action queue has been closed.
    #[error("send queue is closed")]
    SendQueueClosed,

    /// Room protocol or handshake contract error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

enum SessionEnd {
    /// User-initiated leave; no reconnect.
    Leave,
    /// Transport ended after a successful open; reconnect.
    Dropped,
}

#[allow(clippy::too_many_arguments)]
async fn room_connection_worker(
    url: String,
    identity: String,
    reconnect: ReconnectPolicy,
    mut outbound_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    inbound_tx: mpsc::UnboundedSender<ServerMessage>,
    status_tx: mpsc::UnboundedSender<ConnectionStatus>,
    ready_tx: oneshot::Sender<Result<(), RoomClientError>>,
    open: Arc<AtomicBool>,
) {
    let mut ready_tx = Some(ready_tx);
    // Consecutive failures since the last successful open.
    let mut attempts: u32 = 0;

    loop {
        match run_room_session(
            &url,
            &identity,
            &mut outbound_rx,
            &inbound_tx,
            &status_tx,
            &open,
            &mut ready_tx,
        )
        .await
        {
            Ok(SessionEnd::Leave) => {
                let _ = status_tx.send(ConnectionStatus::Disconnected);
                break;
            }
            Ok(SessionEnd::Dropped) => {
                let _ = status_tx.send(ConnectionStatus::Disconnected);
                attempts = 1;
            }
            Err(err) => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(err));
                    return;
                }
                let _ = status_tx.send(ConnectionStatus::Disconnected);
                attempts = attempts.saturating_add(1);
            }
        }

        let delay = reconnect.delay_for_attempt(attempts);
        debug!(
            event = "room_reconnect_scheduled",
            attempt = attempts,
            delay_ms = delay.as_millis() as u64
        );
        if !wait_for_reconnect(delay, &mut outbound_rx).await {
            break;
        }
    }
}

async fn run_room_session(
    url: &str,
    identity: &str,
    outbound_rx: &mut mpsc::UnboundedReceiver<WorkerCommand>,
    inbound_tx: &mpsc::UnboundedSender<ServerMessage>,
    status_tx: &mpsc::UnboundedSender<ConnectionStatus>,
    open: &AtomicBool,
    ready_tx: &mut Option<oneshot::Sender<Result<(), RoomClientError>>>,
) -> Result<SessionEnd, RoomClientError> {
    let (mut socket, _) = connect_async(url).await?;

    // Join with the stable identity immediately on open.
    let join = ClientMessage::Join {
        username: identity.to_string(),
    };
    send_client_message(&mut socket, &join).await?;

    open.store(true, Ordering::SeqCst);
    let _ = status_tx.send(ConnectionStatus::Connected);
    if let Some(tx) = ready_tx.take() {
        let _ = tx.send(Ok(()));
    }

    let end = loop {
        tokio::select! {
            maybe_command = outbound_rx.recv() => {
                match maybe_command {
                    Some(WorkerCommand::Send(message)) => {
                        if send_client_message(&mut socket, &message).await.is_err() {
                            // Lost edit is fine: the rejoin resyncs via init.
                            debug!(event = "room_send_failed");
                            break SessionEnd::Dropped;
                        }
                    }
                    Some(WorkerCommand::Leave) | None => {
                        let _ = socket.close(None).await;
                        break SessionEnd::Leave;
                    }
                }
            }
            maybe_inbound = socket.next() => {
                match maybe_inbound {
                    Some(Ok(Message::Text(text))) => {
                        match ServerMessage::from_text(&text) {
                            Ok(message) => {
                                let _ = inbound_tx.send(message);
                            }
                            Err(err) => {
                                // Malformed or unrecognized payloads are
                                // discarded; the connection stays up.
                                warn!(event = "room_message_discarded", error = %err);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break SessionEnd::Dropped;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => break SessionEnd::Dropped,
                    Some(Ok(_)) => {
                        // Binary frames are not part of the relay protocol.
                        warn!(event = "room_message_discarded", error = "non-text frame");
                    }
                    Some(Err(_)) => break SessionEnd::Dropped,
                    None => break SessionEnd::Dropped,
                }
            }
        }
    };

    open.store(false, Ordering::SeqCst);
    Ok(end)
}

async fn send_client_message<S>(
    socket: &mut tokio_tungstenite::WebSocketStream<S>,
    message: &ClientMessage,
) -> Result<(), RoomClientError>
where
    tokio_tungstenite::WebSocketStream<S>: futures_util::Sink<Message, Error = WsError> + Unpin,
{
    let text = message.to_text()?;
    socket.send(Message::Text(text)).await?;
    Ok(())
}

/// Sleeps out the reconnect delay. Returns `false` when the connection was
/// left (or every handle dropped) in the meantime, cancelling the reconnect.
async fn wait_for_reconnect(
    delay: std::time::Duration,
    outbound_rx: &mut mpsc::UnboundedReceiver<WorkerCommand>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            maybe_command = outbound_rx.recv() => {
                match maybe_command {
                    Some(WorkerCommand::Leave) | None => return false,
                    Some(WorkerCommand::Send(_)) => {
                        debug!(event = "room_action_dropped", reason = "not_connected");
                    }
                }
            }
        }
    }
}
