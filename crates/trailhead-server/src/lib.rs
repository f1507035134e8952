//! Trailhead production server.
//!
//! Production server implementation using Quinn for QUIC transport, Tokio for
//! the async runtime, and system time with cryptographic RNG.
//!
//! # Architecture
//!
//! [`ServerDriver`] is pure: it turns [`ServerEvent`]s into [`ServerAction`]s
//! using the session logic in [`trailhead_core`]. [`Server`] owns the only
//! driver behind a single mutex and executes each event's actions before
//! releasing it, so every session sees its events one at a time and every
//! broadcast of one event goes out before the next event is applied.
//!
//! # Components
//!
//! - [`ServerDriver`]: action-based orchestrator (pure logic, no I/O)
//! - [`SessionRegistry`]: game sessions by key, evicted when empty
//! - [`ConnectionRegistry`]: per-session broadcast groups
//! - [`Server`]: production runtime that executes driver actions
//! - [`QuinnTransport`]: QUIC transport via Quinn
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod registry;
mod server_error;
mod session_registry;
mod system_env;
mod transport;

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::BytesMut;
pub use driver::{LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent};
pub use error::ServerError;
pub use registry::{ConnectionInfo, ConnectionRegistry};
pub use server_error::{DriverError, ExecutorError};
pub use session_registry::SessionRegistry;
pub use system_env::SystemEnv;
use tokio::sync::{Mutex, RwLock};
use trailhead_core::{ConnectionId, env::Environment};
use trailhead_proto::{Frame, FrameHeader};
pub use transport::{QuinnConnection, QuinnTransport};

/// Driver shared between connection tasks and the ticker.
type SharedDriver = Arc<Mutex<ServerDriver<SystemEnv>>>;

/// Shared state for all connections.
#[derive(Default)]
struct SharedState {
    /// Connection id → QUIC connection (for closing)
    connections: RwLock<HashMap<ConnectionId, QuinnConnection>>,
    /// Connection id → persistent outbound stream
    ///
    /// All frames to a client go through this single stream, so they arrive
    /// in the order the driver produced them.
    outbound_streams: RwLock<HashMap<ConnectionId, Mutex<quinn::SendStream>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Interval between `Tick` events (timeouts, heartbeats, vote deadlines)
    pub tick_interval: Duration,
    /// Driver configuration (timeouts, limits, vote deadline)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            tick_interval: Duration::from_secs(1),
            driver: DriverConfig::default(),
        }
    }
}

/// Production Trailhead server.
///
/// Wraps `ServerDriver` with Quinn QUIC transport and system environment.
pub struct Server {
    /// The action-based server driver
    driver: ServerDriver<SystemEnv>,
    /// QUIC endpoint
    transport: QuinnTransport,
    /// Environment
    env: SystemEnv,
    /// Tick period
    tick_interval: Duration,
}

impl Server {
    /// Create and bind a new server. Must be called inside a Tokio runtime.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = ServerDriver::new(env.clone(), config.driver);

        let transport = QuinnTransport::bind(
            &config.bind_address,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?;

        Ok(Self { driver, transport, env, tick_interval: config.tick_interval })
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// Runs until the endpoint is closed.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let env = self.env;
        let driver: SharedDriver = Arc::new(Mutex::new(self.driver));
        let shared = Arc::new(SharedState::default());

        tokio::spawn(run_ticker(Arc::clone(&driver), Arc::clone(&shared), self.tick_interval));

        loop {
            match self.transport.accept().await {
                Ok(Some(conn)) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, driver, shared, env).await {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                },
                Ok(None) => {
                    tracing::info!("Endpoint closed, shutting down");
                    return Ok(());
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Feed periodic `Tick` events to the driver.
async fn run_ticker(driver: SharedDriver, shared: Arc<SharedState>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let mut driver = driver.lock().await;
        match driver.process_event(ServerEvent::Tick) {
            Ok(actions) => execute_actions(actions, &shared).await,
            Err(e) => tracing::warn!("Tick processing error: {}", e),
        }
    }
}

/// Handle a single QUIC connection.
async fn handle_connection(
    conn: QuinnConnection,
    driver: SharedDriver,
    shared: Arc<SharedState>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let connection_id = env.random_u64();

    tracing::debug!("New connection {:#018x} from {}", connection_id, conn.remote_addr());

    let outbound_stream = conn
        .open_uni()
        .await
        .map_err(|e| ServerError::Internal(format!("failed to open outbound stream: {e}")))?;

    shared.connections.write().await.insert(connection_id, conn.clone());
    shared.outbound_streams.write().await.insert(connection_id, Mutex::new(outbound_stream));

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { connection_id })?;
        execute_actions(actions, &shared).await;
    }

    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let driver = Arc::clone(&driver);
                let shared = Arc::clone(&shared);

                tokio::spawn(async move {
                    if let Err(e) = handle_stream(connection_id, send, recv, driver, &shared).await
                    {
                        tracing::debug!("Stream error: {}", e);
                    }
                });
            },
            Err(e) => {
                tracing::debug!("Connection {:#018x} closed: {}", connection_id, e);
                break;
            },
        }
    }

    shared.connections.write().await.remove(&connection_id);
    shared.outbound_streams.write().await.remove(&connection_id);

    let mut driver = driver.lock().await;
    let actions = driver.process_event(ServerEvent::ConnectionClosed {
        connection_id,
        reason: "connection closed".to_string(),
    })?;
    execute_actions(actions, &shared).await;

    Ok(())
}

/// Read frames from one client stream and feed them to the driver.
async fn handle_stream(
    connection_id: ConnectionId,
    send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    driver: SharedDriver,
    shared: &SharedState,
) -> Result<(), ServerError> {
    // Replies go through the per-connection outbound stream
    drop(send);

    let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + 4096);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        if let Err(e) = recv.read_exact(&mut buf[..FrameHeader::SIZE]).await {
            tracing::debug!("Read error: {}", e);
            break;
        }

        let payload_size = match FrameHeader::from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => {
                tracing::warn!("Invalid frame header from {:#018x}: {}", connection_id, e);
                break;
            },
        };

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                tracing::debug!("Payload read error: {}", e);
                break;
            }
        }

        let frame = Frame::decode(&buf)?;

        let mut driver = driver.lock().await;
        match driver.process_event(ServerEvent::FrameReceived { connection_id, frame }) {
            Ok(actions) => execute_actions(actions, shared).await,
            Err(e) => tracing::warn!("Frame processing error: {}", e),
        }
    }

    Ok(())
}

/// Write encoded bytes to one connection's outbound stream.
async fn write_to(
    shared: &SharedState,
    connection_id: ConnectionId,
    bytes: &[u8],
) -> Result<(), ExecutorError> {
    let streams = shared.outbound_streams.read().await;
    let Some(stream) = streams.get(&connection_id) else {
        return Err(ExecutorError::SendFailed {
            connection_id,
            reason: "no outbound stream".to_string(),
        });
    };

    stream
        .lock()
        .await
        .write_all(bytes)
        .await
        .map_err(|e| ExecutorError::SendFailed { connection_id, reason: e.to_string() })
}

/// Execute server actions.
///
/// Delivery failures are logged and skipped; a broken connection is cleaned
/// up when its accept loop observes the close.
async fn execute_actions(actions: Vec<ServerAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ServerAction::SendToConnection { connection_id, frame } => {
                let bytes = match frame.to_vec() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!("Failed to encode frame: {}", e);
                        continue;
                    },
                };
                if let Err(e) = write_to(shared, connection_id, &bytes).await {
                    tracing::warn!("{}", e);
                }
            },

            ServerAction::BroadcastToSession { session_key, recipients, frame } => {
                let bytes = match frame.to_vec() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!("Failed to encode broadcast for {}: {}", session_key, e);
                        continue;
                    },
                };
                for connection_id in recipients {
                    if let Err(e) = write_to(shared, connection_id, &bytes).await {
                        tracing::warn!("Broadcast to session {}: {}", session_key, e);
                    }
                }
            },

            ServerAction::CloseConnection { connection_id, reason } => {
                tracing::info!("Closing connection {:#018x}: {}", connection_id, reason);
                if let Some(conn) = shared.connections.write().await.remove(&connection_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },

            ServerAction::Log { level, message, .. } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}
