//! WebSocket Game Server
//!
//! Async WebSocket server for the real-time path. Each accepted socket is
//! bound to one `(room, participant)` by its `/ws/{roomId}/{userId}` path,
//! checked against the room roster, and then relays client messages to
//! the coordinator. The HTTP fallback is served alongside on its own
//! listener.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::round::{ParticipantId, RoomId};
use crate::network::coordinator::{CoordinatorError, RoomCoordinator};
use crate::network::directory::{InMemoryIdentityProvider, InMemoryRoomDirectory};
use crate::network::http::{self, HttpState};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage};

/// How long a closing connection may spend flushing queued messages.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Smallest accepted outbound queue. One mutation can queue up to three
/// events for a connection (`move_received`, `result`, `peer_disconnected`)
/// on top of a direct reply, so smaller queues would drop healthy clients.
pub const MIN_OUTBOUND_BUFFER: usize = 8;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket bind address.
    pub ws_bind_addr: SocketAddr,
    /// HTTP bind address.
    pub http_bind_addr: SocketAddr,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_buffer: usize,
    /// Deadline for a new socket to finish the WebSocket handshake.
    pub connection_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 8002)),
            http_bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_connections: 1000,
            outbound_buffer: 64,
            connection_timeout: Duration::from_secs(30),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but could not be used.
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure.
        reason: String,
    },
}

impl ServerConfig {
    /// Create config from `ROSHAMBO_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable source. Unset variables
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            ws_bind_addr: parse_var(&lookup, "ROSHAMBO_WS_ADDR", defaults.ws_bind_addr)?,
            http_bind_addr: parse_var(&lookup, "ROSHAMBO_HTTP_ADDR", defaults.http_bind_addr)?,
            max_connections: parse_var(
                &lookup,
                "ROSHAMBO_MAX_CONNECTIONS",
                defaults.max_connections,
            )?,
            outbound_buffer: parse_var(
                &lookup,
                "ROSHAMBO_OUTBOUND_BUFFER",
                defaults.outbound_buffer,
            )?,
            connection_timeout: Duration::from_secs(parse_var(
                &lookup,
                "ROSHAMBO_CONNECTION_TIMEOUT_SECS",
                defaults.connection_timeout.as_secs(),
            )?),
            version: defaults.version,
        };

        if config.outbound_buffer < MIN_OUTBOUND_BUFFER {
            return Err(ConfigError::InvalidValue {
                var: "ROSHAMBO_OUTBOUND_BUFFER",
                value: config.outbound_buffer.to_string(),
                reason: format!("must be at least {MIN_OUTBOUND_BUFFER}"),
            });
        }
        if config.connection_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                var: "ROSHAMBO_CONNECTION_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(config)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::InvalidValue {
                var,
                reason: e.to_string(),
                value,
            }),
        },
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind or accept.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Game server: WebSocket listener plus the HTTP fallback.
pub struct GameServer {
    config: ServerConfig,
    coordinator: Arc<RoomCoordinator>,
    identity: Arc<InMemoryIdentityProvider>,
    directory: Arc<InMemoryRoomDirectory>,
    active: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server with in-memory identity and room services.
    pub fn new(config: ServerConfig) -> Self {
        let identity = Arc::new(InMemoryIdentityProvider::new());
        let directory = Arc::new(InMemoryRoomDirectory::new());
        let coordinator = Arc::new(RoomCoordinator::new(identity.clone(), directory.clone()));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            coordinator,
            identity,
            directory,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared coordinator.
    pub fn coordinator(&self) -> &Arc<RoomCoordinator> {
        &self.coordinator
    }

    /// State handed to the HTTP routes.
    pub fn http_state(&self) -> HttpState {
        HttpState {
            coordinator: self.coordinator.clone(),
            identity: self.identity.clone(),
            directory: self.directory.clone(),
        }
    }

    /// Bind both listeners and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let ws_listener = TcpListener::bind(self.config.ws_bind_addr).await?;
        let http_listener = TcpListener::bind(self.config.http_bind_addr).await?;
        self.serve(ws_listener, http_listener).await
    }

    /// Serve on already-bound listeners until shutdown.
    pub async fn serve(
        &self,
        ws_listener: TcpListener,
        http_listener: TcpListener,
    ) -> Result<(), GameServerError> {
        info!(
            ws = %ws_listener.local_addr()?,
            http = %http_listener.local_addr()?,
            version = %self.config.version,
            "Game server listening"
        );

        let router = http::build_routes(self.http_state());
        let mut http_shutdown = self.shutdown_tx.subscribe();
        let http_task = tokio::spawn(async move {
            axum::serve(http_listener, router)
                .with_graceful_shutdown(async move {
                    let _ = http_shutdown.recv().await;
                })
                .await
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = ws_listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.active.load(Ordering::Relaxed) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        match http_task.await {
            Ok(result) => result?,
            Err(e) => error!("HTTP server task failed: {}", e),
        }

        Ok(())
    }

    /// Spawn the task that owns one WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let limits = ConnectionLimits {
            outbound_buffer: self.config.outbound_buffer.max(MIN_OUTBOUND_BUFFER),
            handshake_timeout: self.config.connection_timeout,
        };
        let coordinator = self.coordinator.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let active = self.active.clone();

        active.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            if let Err(e) = run_connection(stream, addr, coordinator, limits, shutdown_rx).await {
                debug!("Connection {} ended with error: {}", addr, e);
            }
            active.fetch_sub(1, Ordering::Relaxed);
        });
    }

    /// Tell every live connection the server is going away, then stop
    /// both listeners.
    pub async fn shutdown(&self, reason: &str) {
        self.coordinator.shutdown(reason).await;
        let _ = self.shutdown_tx.send(());
    }

    /// Get registered connection count.
    pub async fn connection_count(&self) -> usize {
        self.coordinator.registry().connection_count().await
    }

    /// Sockets currently owned by a connection task, including ones still
    /// handshaking or waiting on admission.
    pub fn socket_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.coordinator.sessions().session_count().await
    }
}

/// Extract `(roomId, userId)` from a `/ws/{roomId}/{userId}` path.
pub fn parse_ws_path(path: &str) -> Option<(RoomId, ParticipantId)> {
    let mut segments = path.trim_start_matches('/').split('/');
    match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some("ws"), Some(room), Some(user), None) if !room.is_empty() && !user.is_empty() => {
            Some((room.to_string(), ParticipantId::new(user)))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct ConnectionLimits {
    outbound_buffer: usize,
    handshake_timeout: Duration,
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("expected /ws/{roomId}/{userId}".to_string()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

#[instrument(skip(stream, coordinator, limits, shutdown_rx))]
async fn run_connection(
    stream: TcpStream,
    addr: SocketAddr,
    coordinator: Arc<RoomCoordinator>,
    limits: ConnectionLimits,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), GameServerError> {
    let mut target = None;
    let callback = |request: &Request, response: Response| {
        match parse_ws_path(request.uri().path()) {
            Some(parsed) => {
                target = Some(parsed);
                Ok(response)
            }
            None => Err(not_found()),
        }
    };

    let handshake = tokio::select! {
        result = tokio::time::timeout(
            limits.handshake_timeout,
            accept_hdr_async(stream, callback),
        ) => result,
        _ = shutdown_rx.recv() => return Ok(()),
    };
    let Ok(accepted) = handshake else {
        debug!("Handshake from {} timed out", addr);
        return Ok(());
    };
    let mut ws_stream = accepted?;

    let Some((room_id, participant)) = target else {
        return Ok(());
    };

    if let Err(e) = coordinator.admit(&room_id, &participant).await {
        info!(
            room = %room_id,
            participant = participant.short(),
            "admission rejected: {}",
            e
        );
        if let Ok(text) = CoordinatorError::from(e).to_message().to_json() {
            ws_stream.send(Message::Text(text)).await?;
        }
        ws_stream
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "not admitted".into(),
            })))
            .await?;
        return Ok(());
    }

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(limits.outbound_buffer);

    // Spawn message sender task. Every exit path ends with a close frame.
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
            if matches!(msg, ServerMessage::Shutdown { .. }) {
                break;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    let handle = coordinator.connect(&room_id, &participant, msg_tx.clone()).await;
    info!(
        room = %room_id,
        participant = participant.short(),
        connection = handle.id,
        "participant connected"
    );

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match ClientMessage::from_json(&text) {
                            Ok(client_msg) => {
                                handle_client_message(
                                    &coordinator,
                                    &room_id,
                                    &participant,
                                    client_msg,
                                )
                                .await
                            }
                            Err(e) => {
                                debug!("Invalid message from {}: {}", addr, e);
                                Some(ServerMessage::error(
                                    ErrorCode::InvalidMessage,
                                    "Invalid message format",
                                ))
                            }
                        };
                        if let Some(reply) = reply {
                            if msg_tx.send(reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let reply = ServerMessage::error(
                            ErrorCode::InvalidMessage,
                            "binary frames are not supported",
                        );
                        if msg_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", addr, e);
                        break;
                    }
                    // Control frames are answered by tungstenite.
                    Some(Ok(_)) => {}
                }
            }
            _ = handle.closed() => {
                debug!("Connection {} closed by the server", addr);
                break;
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    // Cleanup
    coordinator.disconnect(&room_id, &participant, handle.id).await;
    drop(handle);
    drop(msg_tx);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }

    debug!("Client {} cleaned up", addr);
    Ok(())
}

/// Route one parsed client message. Returns the direct reply, if any.
/// Events caused by the message reach this connection through the
/// dispatcher like any other recipient.
async fn handle_client_message(
    coordinator: &RoomCoordinator,
    room_id: &str,
    participant: &ParticipantId,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::SubmitMove { mv } => coordinator
            .submit_move(room_id, participant, &mv)
            .await
            .err()
            .map(|e| e.to_message()),
        ClientMessage::AcknowledgeNextRound => {
            coordinator.acknowledge(room_id, participant).await;
            None
        }
        ClientMessage::QueryStatus => Some(ServerMessage::Status {
            room_status: coordinator.status(room_id).await,
        }),
        ClientMessage::Ping { timestamp } => Some(ServerMessage::Pong {
            timestamp,
            server_time: u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default(),
        }),
    }
}
