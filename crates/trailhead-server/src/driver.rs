//! Server driver.
//!
//! Ties together connection state machines, the [`SessionRegistry`] (game
//! sessions by key) and the [`ConnectionRegistry`] (broadcast groups).
//!
//! The driver is pure: the runtime feeds it [`ServerEvent`]s and executes the
//! returned [`ServerAction`]s. Broadcast recipients are resolved when the
//! action is produced, so a session evicted later in the same event still
//! delivers its final state to everyone who was subscribed.

use std::{collections::HashMap, time::Instant};

use trailhead_core::{
    ConnectionId, Session, SessionConfig, SessionError, SessionEvent,
    connection::{Connection, ConnectionAction, ConnectionConfig},
    env::Environment,
};
use trailhead_proto::{ErrorPayload, Frame, FrameHeader, Opcode, Payload};

use crate::{
    registry::{ConnectionInfo, ConnectionRegistry},
    server_error::DriverError,
    session_registry::SessionRegistry,
};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Connection configuration (timeouts, heartbeat interval)
    pub connection: ConnectionConfig,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Configuration applied to every new session
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            max_connections: 10_000,
            session: SessionConfig::default(),
        }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection id assigned by the runtime
        connection_id: ConnectionId,
    },

    /// A frame was received from a connection
    FrameReceived {
        /// Connection that sent the frame
        connection_id: ConnectionId,
        /// The received frame
        frame: Frame,
    },

    /// A connection was closed (by peer, timeout or error)
    ConnectionClosed {
        /// Connection that was closed
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Periodic tick for timeouts, heartbeats and vote deadlines
    Tick,
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code (production or simulation).
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a frame to one connection
    SendToConnection {
        /// Target connection
        connection_id: ConnectionId,
        /// Frame to send
        frame: Frame,
    },

    /// Deliver a frame to every subscriber of a session
    BroadcastToSession {
        /// Session the broadcast belongs to
        session_key: String,
        /// Subscribers at the time the broadcast was produced
        recipients: Vec<ConnectionId>,
        /// Frame to broadcast
        frame: Frame,
    },

    /// Close a connection
    CloseConnection {
        /// Connection to close
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
        /// When the event occurred
        timestamp: Instant,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based server driver.
///
/// Orchestrates connection management, session operations and frame routing.
pub struct ServerDriver<E>
where
    E: Environment<Instant = Instant>,
{
    /// Connection state machines
    connections: HashMap<ConnectionId, Connection>,
    /// Connection and broadcast group registry
    registry: ConnectionRegistry,
    /// Game sessions by key
    sessions: SessionRegistry<Instant>,
    /// Environment (time, RNG)
    env: E,
    /// Server configuration
    config: ServerConfig,
}

impl<E> ServerDriver<E>
where
    E: Environment<Instant = Instant>,
{
    /// Create a new server driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        Self {
            connections: HashMap::new(),
            registry: ConnectionRegistry::new(),
            sessions: SessionRegistry::new(config.session),
            env,
            config,
        }
    }

    /// Process a server event and return actions to execute.
    ///
    /// # Errors
    ///
    /// - `DriverError::ConnectionNotFound` for frames from unknown connections
    /// - `DriverError::ConnectionAlreadyExists` if an accepted id is in use
    /// - `DriverError::Protocol` if a reply or broadcast cannot be encoded
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { connection_id } => {
                self.handle_connection_accepted(connection_id)
            },
            ServerEvent::FrameReceived { connection_id, frame } => {
                self.handle_frame_received(connection_id, &frame)
            },
            ServerEvent::ConnectionClosed { connection_id, reason } => {
                self.handle_connection_closed(connection_id, &reason)
            },
            ServerEvent::Tick => self.handle_tick(),
        }
    }

    fn handle_connection_accepted(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();

        if self.connections.len() >= self.config.max_connections {
            return Ok(vec![ServerAction::CloseConnection {
                connection_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        if !self.registry.register_connection(connection_id, ConnectionInfo::new()) {
            return Err(DriverError::ConnectionAlreadyExists(connection_id));
        }

        let mut conn = Connection::new(now, self.config.connection.clone());
        conn.set_connection_id(connection_id);
        self.connections.insert(connection_id, conn);

        Ok(vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection {connection_id:#018x} accepted"),
            timestamp: now,
        }])
    }

    fn handle_frame_received(
        &mut self,
        connection_id: ConnectionId,
        frame: &Frame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();
        let request_id = frame.header.request_id();

        let conn = self
            .connections
            .get_mut(&connection_id)
            .ok_or(DriverError::ConnectionNotFound(connection_id))?;

        let opcode = frame.header.opcode_enum();
        let session_layer = match opcode {
            None | Some(Opcode::Error) => true,
            Some(op) => op.is_session_layer(),
        };

        if session_layer {
            return match conn.handle_frame(frame, now) {
                Ok(conn_actions) => {
                    if opcode == Some(Opcode::Hello) && conn.is_authenticated() {
                        let context = conn.caller_context().map(<[u8]>::to_vec);
                        self.registry.mark_authenticated(connection_id, context);
                    }
                    Ok(convert_connection_actions(connection_id, conn_actions))
                },
                Err(err) => {
                    conn.close();
                    let reason = err.to_string();
                    let mut actions = error_reply(
                        connection_id,
                        request_id,
                        ErrorPayload::frame_rejected(reason.clone()),
                        now,
                    )?;
                    actions.push(ServerAction::CloseConnection { connection_id, reason });
                    Ok(actions)
                },
            };
        }

        if !conn.is_authenticated() {
            return error_reply(connection_id, request_id, ErrorPayload::not_authenticated(), now);
        }
        conn.update_activity(now);

        match Payload::from_frame(frame) {
            Ok(payload) => self.dispatch(connection_id, request_id, payload),
            Err(err) => error_reply(
                connection_id,
                request_id,
                ErrorPayload::invalid_payload(err.to_string()),
                now,
            ),
        }
    }

    /// Route a decoded game frame to its session.
    fn dispatch(
        &mut self,
        connection_id: ConnectionId,
        request_id: u32,
        payload: Payload,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();

        match payload {
            Payload::Join(join) => {
                let key = join.session_key;
                let caller_context = self
                    .registry
                    .connection(connection_id)
                    .and_then(|info| info.caller_context.clone());

                let session = self.sessions.get_or_create(&key);
                let events = match session.join(
                    &self.env,
                    connection_id,
                    caller_context.as_deref(),
                    join.player,
                ) {
                    Ok(events) => events,
                    Err(err) => {
                        let mut actions = reject(connection_id, request_id, &err, now)?;
                        actions.extend(self.evict_if_empty(&key));
                        return Ok(actions);
                    },
                };
                self.registry.subscribe(connection_id, &key);

                let mut actions = self.emit(&key, events)?;
                actions.extend(self.evict_if_empty(&key));
                Ok(actions)
            },

            Payload::Leave(target) => {
                let key = target.session_key;
                let Some(session) = self.sessions.get_mut(&key) else {
                    let err = SessionError::SessionNotFound { key };
                    return reject(connection_id, request_id, &err, now);
                };

                match session.leave(connection_id) {
                    Ok(events) => {
                        self.registry.unsubscribe(connection_id, &key);
                        let mut actions = self.emit(&key, events)?;
                        actions.extend(self.evict_if_empty(&key));
                        Ok(actions)
                    },
                    Err(err) => reject(connection_id, request_id, &err, now),
                }
            },

            Payload::StartGame(target) => {
                self.apply(connection_id, request_id, &target.session_key, |session, env| {
                    session.start_game(env, connection_id)
                })
            },

            Payload::GameAction(action) => {
                let key = action.session_key.clone();
                self.apply(connection_id, request_id, &key, |session, _| {
                    session.apply_action(connection_id, action)
                })
            },

            Payload::EndTurn(target) => {
                self.apply(connection_id, request_id, &target.session_key, |session, _| {
                    session.end_turn(connection_id)
                })
            },

            Payload::NextTurn(next) => {
                self.apply(connection_id, request_id, &next.session_key, |session, _| {
                    session.next_turn(connection_id, &next.player_name)
                })
            },

            Payload::StartVote(start) => {
                self.apply(connection_id, request_id, &start.session_key, |session, _| {
                    session.start_vote(connection_id, &start.target, now)
                })
            },

            Payload::CastVote(ballot) => {
                self.apply(connection_id, request_id, &ballot.session_key, |session, _| {
                    session.cast_vote(connection_id, &ballot.voter, &ballot.choice)
                })
            },

            Payload::Chat(message) => {
                let key = message.session_key.clone();
                self.apply(connection_id, request_id, &key, |session, _| Ok(session.chat(message)))
            },

            Payload::GetSession(target) => match self.sessions.get(&target.session_key) {
                Some(session) => {
                    let state = Payload::SessionState(session.state());
                    reply(connection_id, request_id, state)
                },
                None => {
                    let err = SessionError::SessionNotFound { key: target.session_key };
                    reject(connection_id, request_id, &err, now)
                },
            },

            other => error_reply(
                connection_id,
                request_id,
                ErrorPayload::frame_rejected(format!(
                    "opcode {:#06x} is not accepted from clients",
                    other.opcode().to_u16()
                )),
                now,
            ),
        }
    }

    /// Run `op` against an existing session, then broadcast and evict.
    fn apply<F>(
        &mut self,
        connection_id: ConnectionId,
        request_id: u32,
        key: &str,
        op: F,
    ) -> Result<Vec<ServerAction>, DriverError>
    where
        F: FnOnce(&mut Session<Instant>, &E) -> Result<Vec<SessionEvent>, SessionError>,
    {
        let now = self.env.now();
        let Some(session) = self.sessions.get_mut(key) else {
            let err = SessionError::SessionNotFound { key: key.to_string() };
            return reject(connection_id, request_id, &err, now);
        };

        match op(session, &self.env) {
            Ok(events) => {
                let mut actions = self.emit(key, events)?;
                actions.extend(self.evict_if_empty(key));
                Ok(actions)
            },
            Err(err) => reject(connection_id, request_id, &err, now),
        }
    }

    /// Turn session events into broadcasts and logs.
    fn emit(&self, key: &str, events: Vec<SessionEvent>) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();
        let recipients = self.registry.subscribers(key);

        let mut actions = Vec::with_capacity(events.len());
        for event in events {
            match event {
                SessionEvent::Broadcast(payload) => {
                    actions.push(ServerAction::BroadcastToSession {
                        session_key: key.to_string(),
                        recipients: recipients.clone(),
                        frame: payload.to_frame()?,
                    });
                },
                SessionEvent::Anomaly(err) => actions.push(ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!("session {key}: {err}"),
                    timestamp: now,
                }),
            }
        }
        Ok(actions)
    }

    /// Destroy the session and its broadcast group if its roster is empty.
    fn evict_if_empty(&mut self, key: &str) -> Option<ServerAction> {
        if !self.sessions.evict_if_empty(key) {
            return None;
        }
        self.registry.drop_session(key);

        Some(ServerAction::Log {
            level: LogLevel::Info,
            message: format!("session {key} is empty, evicted"),
            timestamp: self.env.now(),
        })
    }

    fn handle_connection_closed(
        &mut self,
        connection_id: ConnectionId,
        reason: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();
        let mut actions = Vec::new();

        if let Some(mut conn) = self.connections.remove(&connection_id) {
            conn.close();
        }

        let keys = match self.registry.unregister_connection(connection_id) {
            Some((_info, keys)) => {
                let mut keys: Vec<String> = keys.into_iter().collect();
                keys.sort_unstable();
                keys
            },
            None => self.sessions.sessions_for_connection(connection_id),
        };

        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!(
                "connection {connection_id:#018x} closed: {reason}, was in {} sessions",
                keys.len()
            ),
            timestamp: now,
        });

        for key in keys {
            let Some(session) = self.sessions.get_mut(&key) else {
                continue;
            };
            let events = session.disconnect(connection_id);
            actions.extend(self.emit(&key, events)?);
            actions.extend(self.evict_if_empty(&key));
        }

        Ok(actions)
    }

    fn handle_tick(&mut self) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();
        let mut actions = Vec::new();

        let mut connection_ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        connection_ids.sort_unstable();

        for connection_id in connection_ids {
            if let Some(conn) = self.connections.get_mut(&connection_id) {
                actions.extend(convert_connection_actions(connection_id, conn.tick(now)));
            }
        }

        for key in self.sessions.keys() {
            let Some(session) = self.sessions.get_mut(&key) else {
                continue;
            };
            let events = session.tick(now);
            if events.is_empty() {
                continue;
            }
            actions.extend(self.emit(&key, events)?);
            actions.extend(self.evict_if_empty(&key));
        }

        Ok(actions)
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Session under `key`. `None` if it never existed or was evicted.
    pub fn session(&self, key: &str) -> Option<&Session<Instant>> {
        self.sessions.get(key)
    }

    /// All live sessions.
    pub fn sessions(&self) -> &SessionRegistry<Instant> {
        &self.sessions
    }

    /// Connections subscribed to a session, sorted.
    pub fn subscribers(&self, key: &str) -> Vec<ConnectionId> {
        self.registry.subscribers(key)
    }

    /// Connection and broadcast group registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Whether a connection completed the handshake.
    pub fn is_authenticated(&self, connection_id: ConnectionId) -> bool {
        self.connections.get(&connection_id).is_some_and(Connection::is_authenticated)
    }
}

impl<E> std::fmt::Debug for ServerDriver<E>
where
    E: Environment<Instant = Instant>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connection_count", &self.connections.len())
            .field("session_count", &self.sessions.len())
            .finish()
    }
}

fn convert_connection_actions(
    connection_id: ConnectionId,
    conn_actions: Vec<ConnectionAction>,
) -> Vec<ServerAction> {
    conn_actions
        .into_iter()
        .map(|action| match action {
            ConnectionAction::SendFrame(frame) => {
                ServerAction::SendToConnection { connection_id, frame }
            },
            ConnectionAction::Close { reason } => {
                ServerAction::CloseConnection { connection_id, reason }
            },
        })
        .collect()
}

/// Point-to-point error frame echoing the rejected request id.
fn error_reply(
    connection_id: ConnectionId,
    request_id: u32,
    error: ErrorPayload,
    now: Instant,
) -> Result<Vec<ServerAction>, DriverError> {
    let message = format!(
        "rejected request {request_id} from {connection_id:#018x}: {} ({:#06x})",
        error.message, error.code
    );

    let mut header = FrameHeader::new(Opcode::Error);
    header.set_request_id(request_id);
    let frame = Payload::Error(error).into_frame(header)?;

    Ok(vec![ServerAction::SendToConnection { connection_id, frame }, ServerAction::Log {
        level: LogLevel::Debug,
        message,
        timestamp: now,
    }])
}

/// Point-to-point answer to a read-only request.
fn reply(
    connection_id: ConnectionId,
    request_id: u32,
    payload: Payload,
) -> Result<Vec<ServerAction>, DriverError> {
    let mut header = FrameHeader::new(payload.opcode());
    header.set_request_id(request_id);
    let frame = payload.into_frame(header)?;
    Ok(vec![ServerAction::SendToConnection { connection_id, frame }])
}

fn reject(
    connection_id: ConnectionId,
    request_id: u32,
    err: &SessionError,
    now: Instant,
) -> Result<Vec<ServerAction>, DriverError> {
    error_reply(connection_id, request_id, err.to_payload(), now)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use bytes::Bytes;
    use trailhead_core::connection::PROTOCOL_VERSION;
    use trailhead_proto::payloads::{
        lobby::{ChatMessage, Join, PlayerProfile, SessionRef},
        session::Hello,
    };

    use super::*;

    #[derive(Clone, Default)]
    struct TestEnv {
        counter: Arc<AtomicU64>,
    }

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let value = (self.counter.fetch_add(1, Ordering::Relaxed) + 1).to_be_bytes();
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = value[i % value.len()];
            }
        }
    }

    fn driver() -> ServerDriver<TestEnv> {
        ServerDriver::new(TestEnv::default(), ServerConfig::default())
    }

    fn frame(payload: Payload, request_id: u32) -> Frame {
        let mut header = FrameHeader::new(payload.opcode());
        header.set_request_id(request_id);
        payload.into_frame(header).unwrap()
    }

    fn send(
        server: &mut ServerDriver<TestEnv>,
        connection_id: ConnectionId,
        payload: Payload,
    ) -> Vec<ServerAction> {
        server
            .process_event(ServerEvent::FrameReceived {
                connection_id,
                frame: frame(payload, 7),
            })
            .unwrap()
    }

    fn connect(server: &mut ServerDriver<TestEnv>, connection_id: ConnectionId) {
        server.process_event(ServerEvent::ConnectionAccepted { connection_id }).unwrap();
        send(server, connection_id, Payload::Hello(Hello {
            version: PROTOCOL_VERSION,
            auth_token: None,
        }));
    }

    fn join(name: &str) -> Payload {
        Payload::Join(Join {
            session_key: "L1".to_string(),
            player: PlayerProfile { name: name.to_string(), avatar: None, stats: Bytes::new() },
        })
    }

    fn error_code(actions: &[ServerAction]) -> Option<(u16, u32)> {
        actions.iter().find_map(|action| match action {
            ServerAction::SendToConnection { frame, .. } => match Payload::from_frame(frame) {
                Ok(Payload::Error(err)) => Some((err.code, frame.header.request_id())),
                _ => None,
            },
            _ => None,
        })
    }

    #[test]
    fn server_accepts_connection() {
        let mut server = driver();

        let actions =
            server.process_event(ServerEvent::ConnectionAccepted { connection_id: 1 }).unwrap();

        assert_eq!(server.connection_count(), 1);
        assert!(matches!(actions[0], ServerAction::Log { level: LogLevel::Debug, .. }));
    }

    #[test]
    fn server_rejects_when_max_connections_exceeded() {
        let config = ServerConfig { max_connections: 2, ..Default::default() };
        let mut server = ServerDriver::new(TestEnv::default(), config);

        server.process_event(ServerEvent::ConnectionAccepted { connection_id: 1 }).unwrap();
        server.process_event(ServerEvent::ConnectionAccepted { connection_id: 2 }).unwrap();

        let actions =
            server.process_event(ServerEvent::ConnectionAccepted { connection_id: 3 }).unwrap();

        assert_eq!(server.connection_count(), 2);
        assert!(matches!(actions[0], ServerAction::CloseConnection { .. }));
    }

    #[test]
    fn duplicate_connection_id_is_an_error() {
        let mut server = driver();
        server.process_event(ServerEvent::ConnectionAccepted { connection_id: 1 }).unwrap();

        let result = server.process_event(ServerEvent::ConnectionAccepted { connection_id: 1 });
        assert_eq!(result.unwrap_err(), DriverError::ConnectionAlreadyExists(1));
    }

    #[test]
    fn frame_from_unknown_connection() {
        let mut server = driver();
        let result = server.process_event(ServerEvent::FrameReceived {
            connection_id: 9,
            frame: frame(Payload::Ping, 0),
        });
        assert_eq!(result.unwrap_err(), DriverError::ConnectionNotFound(9));
    }

    #[test]
    fn hello_marks_registry_authenticated() {
        let mut server = driver();
        connect(&mut server, 1);

        assert!(server.is_authenticated(1));
        assert_eq!(server.registry().connection(1).map(|i| i.authenticated), Some(true));
    }

    #[test]
    fn game_frame_before_handshake_is_rejected() {
        let mut server = driver();
        server.process_event(ServerEvent::ConnectionAccepted { connection_id: 1 }).unwrap();

        let actions = send(&mut server, 1, join("A"));

        assert_eq!(error_code(&actions), Some((ErrorPayload::NOT_AUTHENTICATED, 7)));
        assert_eq!(server.session_count(), 0);
    }

    #[test]
    fn join_subscribes_and_broadcasts() {
        let mut server = driver();
        connect(&mut server, 1);
        connect(&mut server, 2);

        send(&mut server, 1, join("A"));
        let actions = send(&mut server, 2, join("B"));

        assert_eq!(server.subscribers("L1"), vec![1, 2]);
        match &actions[..] {
            [ServerAction::BroadcastToSession { recipients, frame, .. }] => {
                assert_eq!(recipients, &vec![1, 2]);
                assert_eq!(frame.header.opcode_enum(), Some(Opcode::SessionState));
            },
            other => panic!("unexpected actions {other:?}"),
        }
    }

    #[test]
    fn relay_to_unknown_session_echoes_request_id() {
        let mut server = driver();
        connect(&mut server, 1);

        let chat = Payload::Chat(ChatMessage {
            session_key: "nope".to_string(),
            author: "A".to_string(),
            body: "hi".to_string(),
        });
        let actions = send(&mut server, 1, chat);

        assert_eq!(error_code(&actions), Some((ErrorPayload::SESSION_NOT_FOUND, 7)));
    }

    #[test]
    fn get_session_answers_only_the_caller() {
        let mut server = driver();
        connect(&mut server, 1);
        connect(&mut server, 2);
        send(&mut server, 1, join("A"));

        let query = Payload::GetSession(SessionRef { session_key: "L1".to_string() });
        let actions = send(&mut server, 2, query);

        match &actions[..] {
            [ServerAction::SendToConnection { connection_id: 2, frame }] => {
                assert_eq!(frame.header.request_id(), 7);
                let Ok(Payload::SessionState(state)) = Payload::from_frame(frame) else {
                    panic!("expected session state");
                };
                assert_eq!(state.players.len(), 1);
            },
            other => panic!("unexpected actions {other:?}"),
        }
        assert_eq!(server.subscribers("L1"), vec![1]);

        let missing = Payload::GetSession(SessionRef { session_key: "nope".to_string() });
        let actions = send(&mut server, 2, missing);
        assert_eq!(error_code(&actions), Some((ErrorPayload::SESSION_NOT_FOUND, 7)));
        assert_eq!(server.session_count(), 1);
    }

    #[test]
    fn join_under_a_name_held_by_another_caller_is_rejected() {
        let mut server = driver();
        for (connection_id, token) in [(1, &b"alice"[..]), (2, &b"mallory"[..])] {
            server.process_event(ServerEvent::ConnectionAccepted { connection_id }).unwrap();
            send(&mut server, connection_id, Payload::Hello(Hello {
                version: PROTOCOL_VERSION,
                auth_token: Some(token.to_vec()),
            }));
        }
        send(&mut server, 1, join("A"));

        let actions = send(&mut server, 2, join("A"));

        assert_eq!(error_code(&actions), Some((ErrorPayload::IDENTITY_MISMATCH, 7)));
        assert_eq!(server.session("L1").unwrap().roster().by_name("A").unwrap().connection_id, 1);
        assert_eq!(server.subscribers("L1"), vec![1]);
    }

    #[test]
    fn garbage_payload_gets_invalid_payload() {
        let mut server = driver();
        connect(&mut server, 1);

        let garbage = Frame::new(FrameHeader::new(Opcode::Join), Bytes::from_static(b"\xff\x00"));
        let actions = server
            .process_event(ServerEvent::FrameReceived { connection_id: 1, frame: garbage })
            .unwrap();

        assert_eq!(error_code(&actions).map(|(code, _)| code), Some(ErrorPayload::INVALID_PAYLOAD));
        assert_eq!(server.connection_count(), 1);
    }

    #[test]
    fn server_broadcast_opcode_from_client_is_rejected() {
        let mut server = driver();
        connect(&mut server, 1);
        send(&mut server, 1, join("A"));

        let state = server.session("L1").unwrap().state();
        let actions = send(&mut server, 1, Payload::SessionState(state));

        assert_eq!(error_code(&actions).map(|(code, _)| code), Some(ErrorPayload::FRAME_REJECTED));
    }

    #[test]
    fn unsupported_hello_version_closes() {
        let mut server = driver();
        server.process_event(ServerEvent::ConnectionAccepted { connection_id: 1 }).unwrap();

        let actions = send(&mut server, 1, Payload::Hello(Hello { version: 99, auth_token: None }));

        assert!(actions.iter().any(|a| matches!(a, ServerAction::CloseConnection { .. })));
        assert_eq!(error_code(&actions).map(|(code, _)| code), Some(ErrorPayload::FRAME_REJECTED));
    }

    #[test]
    fn leave_evicts_last_session() {
        let mut server = driver();
        connect(&mut server, 1);
        send(&mut server, 1, join("A"));

        let actions =
            send(&mut server, 1, Payload::Leave(SessionRef { session_key: "L1".to_string() }));

        assert_eq!(server.session_count(), 0);
        assert!(server.subscribers("L1").is_empty());
        assert!(
            actions.iter().any(|a| matches!(a, ServerAction::Log { level: LogLevel::Info, .. }))
        );
    }

    #[test]
    fn leave_without_membership_is_rejected() {
        let mut server = driver();
        connect(&mut server, 1);
        connect(&mut server, 2);
        send(&mut server, 1, join("A"));

        let actions =
            send(&mut server, 2, Payload::Leave(SessionRef { session_key: "L1".to_string() }));

        assert_eq!(error_code(&actions).map(|(code, _)| code), Some(ErrorPayload::NOT_A_MEMBER));
        assert_eq!(server.session("L1").map(|s| s.roster().len()), Some(1));
    }

    #[test]
    fn disconnect_removes_player_from_every_session() {
        let mut server = driver();
        connect(&mut server, 1);
        connect(&mut server, 2);
        send(&mut server, 1, join("A"));
        send(&mut server, 2, join("B"));

        let actions = server
            .process_event(ServerEvent::ConnectionClosed {
                connection_id: 1,
                reason: "gone".to_string(),
            })
            .unwrap();

        assert_eq!(server.connection_count(), 1);
        assert_eq!(server.session("L1").map(|s| s.roster().len()), Some(1));
        assert_eq!(server.subscribers("L1"), vec![2]);
        assert!(actions.iter().any(|a| matches!(
            a,
            ServerAction::BroadcastToSession { recipients, .. } if recipients == &vec![2]
        )));
    }
}
