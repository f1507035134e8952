//! Simulation server wrapper for scripted driver tests.
//!
//! `SimServer` owns a [`ServerDriver`] over [`SimEnv`] and plays the role of
//! the production runtime: it executes every action the driver returns,
//! records the frames each connection would receive, and feeds a
//! `ConnectionClosed` event back for every connection the driver closes.
//!
//! ## Architecture
//!
//! ```text
//! SimServer
//!   ├─ ServerDriver<SimEnv>              (Sans-IO core)
//!   ├─ inboxes: conn_id → Vec<Frame>     (delivered frames)
//!   └─ closed: conn_id set               (connections the server dropped)
//! ```

use std::collections::{BTreeSet, HashMap};

use bytes::Bytes;
use trailhead_core::{ConnectionId, connection::PROTOCOL_VERSION};
use trailhead_proto::{
    Frame, FrameHeader, Payload,
    payloads::{
        lobby::{CastVote, Join, PlayerProfile, SessionRef, StartVote},
        session::Hello,
    },
};
use trailhead_server::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent};

use crate::{SimEnv, invariants::SystemSnapshot};

/// Error type for the simulation server.
#[derive(Debug, Clone)]
pub struct SimServerError(pub String);

impl std::fmt::Display for SimServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimServerError: {}", self.0)
    }
}

impl std::error::Error for SimServerError {}

impl From<trailhead_server::DriverError> for SimServerError {
    fn from(err: trailhead_server::DriverError) -> Self {
        Self(err.to_string())
    }
}

impl From<trailhead_proto::ProtocolError> for SimServerError {
    fn from(err: trailhead_proto::ProtocolError) -> Self {
        Self(err.to_string())
    }
}

/// Simulated server driven explicitly by a test.
pub struct SimServer {
    driver: ServerDriver<SimEnv>,
    env: SimEnv,
    inboxes: HashMap<ConnectionId, Vec<Frame>>,
    closed: BTreeSet<ConnectionId>,
    next_request_id: u32,
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

impl SimServer {
    /// Server with the given config and RNG seed 0.
    pub fn new(config: DriverConfig) -> Self {
        Self::with_seed(0, config)
    }

    /// Server with an explicit RNG seed.
    pub fn with_seed(seed: u64, config: DriverConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let driver = ServerDriver::new(env.clone(), config);
        Self { driver, env, inboxes: HashMap::new(), closed: BTreeSet::new(), next_request_id: 1 }
    }

    /// The shared simulated environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The wrapped driver.
    pub fn driver(&self) -> &ServerDriver<SimEnv> {
        &self.driver
    }

    /// Snapshot for invariant checks.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::from_driver(&self.driver)
    }

    /// Accept a connection without completing the handshake.
    pub fn accept(&mut self, connection_id: ConnectionId) -> Result<(), SimServerError> {
        self.inboxes.entry(connection_id).or_default();
        self.closed.remove(&connection_id);
        self.process(ServerEvent::ConnectionAccepted { connection_id }).map(drop)
    }

    /// Accept a connection and complete the Hello handshake.
    pub fn connect(&mut self, connection_id: ConnectionId) -> Result<(), SimServerError> {
        self.handshake(connection_id, None)
    }

    /// Accept a connection and complete the Hello handshake with a caller token.
    pub fn connect_with_token(
        &mut self,
        connection_id: ConnectionId,
        token: &[u8],
    ) -> Result<(), SimServerError> {
        self.handshake(connection_id, Some(token.to_vec()))
    }

    fn handshake(
        &mut self,
        connection_id: ConnectionId,
        auth_token: Option<Vec<u8>>,
    ) -> Result<(), SimServerError> {
        self.accept(connection_id)?;
        let hello = Hello { version: PROTOCOL_VERSION, auth_token };
        self.send(connection_id, Payload::Hello(hello)).map(drop)
    }

    /// Send a payload from a client with a fresh request id.
    pub fn send(
        &mut self,
        connection_id: ConnectionId,
        payload: Payload,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.send_with_request_id(connection_id, payload, request_id)
    }

    /// Send a payload from a client with an explicit request id.
    pub fn send_with_request_id(
        &mut self,
        connection_id: ConnectionId,
        payload: Payload,
        request_id: u32,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        let mut header = FrameHeader::new(payload.opcode());
        header.set_request_id(request_id);
        let frame = payload.into_frame(header)?;
        self.send_frame(connection_id, frame)
    }

    /// Deliver a raw frame from a client.
    pub fn send_frame(
        &mut self,
        connection_id: ConnectionId,
        frame: Frame,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        self.process(ServerEvent::FrameReceived { connection_id, frame })
    }

    /// Transport-level disconnect.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Result<(), SimServerError> {
        self.closed.insert(connection_id);
        self.process(ServerEvent::ConnectionClosed {
            connection_id,
            reason: "client disconnected".to_string(),
        })
        .map(drop)
    }

    /// Run one tick at the current virtual time.
    pub fn tick(&mut self) -> Result<Vec<ServerAction>, SimServerError> {
        self.process(ServerEvent::Tick)
    }

    /// Advance virtual time, then tick.
    pub fn advance(
        &mut self,
        by: std::time::Duration,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        self.env.advance(by);
        self.tick()
    }

    /// Join `session_key` as `name`.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        session_key: &str,
        name: &str,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        self.send(
            connection_id,
            Payload::Join(Join {
                session_key: session_key.to_string(),
                player: PlayerProfile { name: name.to_string(), avatar: None, stats: Bytes::new() },
            }),
        )
    }

    /// Leave `session_key`.
    pub fn leave(
        &mut self,
        connection_id: ConnectionId,
        session_key: &str,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        let session = SessionRef { session_key: session_key.to_string() };
        self.send(connection_id, Payload::Leave(session))
    }

    /// Ask for the state of `session_key` without joining it.
    pub fn get_session(
        &mut self,
        connection_id: ConnectionId,
        session_key: &str,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        let session = SessionRef { session_key: session_key.to_string() };
        self.send(connection_id, Payload::GetSession(session))
    }

    /// Start the game in `session_key`.
    pub fn start_game(
        &mut self,
        connection_id: ConnectionId,
        session_key: &str,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        let target = SessionRef { session_key: session_key.to_string() };
        self.send(connection_id, Payload::StartGame(target))
    }

    /// End the current turn in `session_key`.
    pub fn end_turn(
        &mut self,
        connection_id: ConnectionId,
        session_key: &str,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        let target = SessionRef { session_key: session_key.to_string() };
        self.send(connection_id, Payload::EndTurn(target))
    }

    /// Open a vote against `target`.
    pub fn start_vote(
        &mut self,
        connection_id: ConnectionId,
        session_key: &str,
        target: &str,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        self.send(
            connection_id,
            Payload::StartVote(StartVote {
                session_key: session_key.to_string(),
                target: target.to_string(),
            }),
        )
    }

    /// Cast `voter`'s ballot for `choice`.
    pub fn cast_vote(
        &mut self,
        connection_id: ConnectionId,
        session_key: &str,
        voter: &str,
        choice: &str,
    ) -> Result<Vec<ServerAction>, SimServerError> {
        self.send(
            connection_id,
            Payload::CastVote(CastVote {
                session_key: session_key.to_string(),
                voter: voter.to_string(),
                choice: choice.to_string(),
            }),
        )
    }

    /// Take the frames delivered to a connection since the last call.
    pub fn take_frames(&mut self, connection_id: ConnectionId) -> Vec<Frame> {
        self.inboxes.get_mut(&connection_id).map(std::mem::take).unwrap_or_default()
    }

    /// Take and decode the payloads delivered to a connection.
    ///
    /// Frames that fail to decode are skipped.
    pub fn take_payloads(&mut self, connection_id: ConnectionId) -> Vec<Payload> {
        self.take_frames(connection_id).iter().filter_map(|f| Payload::from_frame(f).ok()).collect()
    }

    /// Whether the server closed (or the client dropped) a connection.
    pub fn is_closed(&self, connection_id: ConnectionId) -> bool {
        self.closed.contains(&connection_id)
    }

    fn process(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, SimServerError> {
        let actions = self.driver.process_event(event)?;
        let dropped = self.execute(&actions);

        // The production accept loop reports every closed connection back
        for connection_id in dropped {
            let follow_up = self.driver.process_event(ServerEvent::ConnectionClosed {
                connection_id,
                reason: "closed by server".to_string(),
            })?;
            self.execute(&follow_up);
        }

        Ok(actions)
    }

    /// Record deliveries. Returns connections newly closed by the server.
    fn execute(&mut self, actions: &[ServerAction]) -> Vec<ConnectionId> {
        let mut dropped = Vec::new();

        for action in actions {
            match action {
                ServerAction::SendToConnection { connection_id, frame } => {
                    self.deliver(*connection_id, frame);
                },
                ServerAction::BroadcastToSession { recipients, frame, .. } => {
                    for connection_id in recipients {
                        self.deliver(*connection_id, frame);
                    }
                },
                ServerAction::CloseConnection { connection_id, reason } => {
                    tracing::debug!("sim: closing {:#x}: {}", connection_id, reason);
                    if self.closed.insert(*connection_id) {
                        dropped.push(*connection_id);
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

        dropped
    }

    fn deliver(&mut self, connection_id: ConnectionId, frame: &Frame) {
        if self.closed.contains(&connection_id) {
            return;
        }
        self.inboxes.entry(connection_id).or_default().push(frame.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_completes_handshake() {
        let mut server = SimServer::default();
        server.connect(1).unwrap();

        assert!(server.driver().is_authenticated(1));
        let replies = server.take_payloads(1);
        assert!(matches!(replies.as_slice(), [Payload::HelloReply(_)]));
    }

    #[test]
    fn join_broadcast_reaches_inbox() {
        let mut server = SimServer::default();
        server.connect(1).unwrap();
        server.take_frames(1);

        server.join(1, "L1", "A").unwrap();

        let payloads = server.take_payloads(1);
        assert!(
            payloads
                .iter()
                .any(|p| matches!(p, Payload::SessionState(s) if s.players.len() == 1))
        );
        assert!(server.take_frames(1).is_empty());
    }

    #[test]
    fn server_close_feeds_back_disconnect() {
        let mut server = SimServer::default();
        server.connect(1).unwrap();
        server.join(1, "L1", "A").unwrap();

        server.send(1, Payload::Hello(Hello { version: 99, auth_token: None })).unwrap();

        assert!(server.is_closed(1));
        assert_eq!(server.driver().connection_count(), 0);
        assert_eq!(server.driver().session_count(), 0);
    }
}
