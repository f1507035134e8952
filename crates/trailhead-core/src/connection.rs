//! Session layer state machine.
//!
//! Manages connection lifecycle, heartbeats, timeouts, and graceful shutdown
//! for one client connection on the server side. Uses the action pattern:
//! methods take time as input and return actions for the driver to execute.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  Hello / HelloReply  ┌───────────────┐
//! │ Init │─────────────────────>│ Authenticated │
//! └──────┘                      └───────────────┘
//!    │ Timeout/Goodbye                  │ Goodbye/Timeout/Error
//!    ↓                                  ↓
//! ┌────────┐                       ┌────────┐
//! │ Closed │                       │ Closed │
//! └────────┘                       └────────┘
//! ```
//!
//! Only session-layer opcodes are handled here. Lobby, turn and vote frames
//! are routed by the driver once the connection is authenticated.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use trailhead_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::session::{Goodbye, HelloReply},
};

use crate::{error::ConnectionError, player::ConnectionId};

/// Protocol version accepted in `Hello`.
pub const PROTOCOL_VERSION: u8 = 1;

/// Time allowed to complete the Hello/HelloReply handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time allowed without any activity before the connection is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which the server sends Ping frames while authenticated.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Send this frame to the peer
    SendFrame(Frame),

    /// Close the connection with this reason
    Close {
        /// Reason for closing the connection
        reason: String,
    },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, waiting for Hello
    Init,
    /// Handshake completed
    Authenticated,
    /// Connection closed (graceful or error)
    Closed,
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for completing handshake
    pub handshake_timeout: Duration,
    /// Idle timeout before disconnecting
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be < idle_timeout / 2)
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Connection state machine
///
/// Pure state machine: no I/O, no Environment storage. Time is passed as
/// parameters to methods that need it. Generic over `Instant` to support
/// virtual time in deterministic tests.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    last_activity: I,
    last_heartbeat: Option<I>,
    /// Connection id (assigned by server before Hello)
    connection_id: Option<ConnectionId>,
    /// Opaque, already verified caller context from Hello
    caller_context: Option<Vec<u8>>,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new connection in [`ConnectionState::Init`] state
    pub fn new(now: I, config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Init,
            config,
            last_activity: now,
            last_heartbeat: None,
            connection_id: None,
            caller_context: None,
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether game frames may be routed for this connection.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Connection id assigned by the server. `None` before assignment.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    /// Caller credential presented in Hello, if any.
    #[must_use]
    pub fn caller_context(&self) -> Option<&[u8]> {
        self.caller_context.as_deref()
    }

    /// Assign the connection id (server use, before handling Hello).
    pub fn set_connection_id(&mut self, connection_id: ConnectionId) {
        self.connection_id = Some(connection_id);
    }

    /// Mark connection as closed.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Mark connection as active (call when receiving frames).
    pub fn update_activity(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Elapsed time since last activity, if timeout exceeded. `None` otherwise.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        let elapsed = now - self.last_activity;

        let timeout = match self.state {
            ConnectionState::Init => self.config.handshake_timeout,
            ConnectionState::Authenticated => self.config.idle_timeout,
            ConnectionState::Closed => return None,
        };

        if elapsed > timeout { Some(elapsed) } else { None }
    }

    /// Process periodic maintenance (timeouts and heartbeats).
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if let Some(elapsed) = self.check_timeout(now) {
            let reason = match self.state {
                ConnectionState::Init => format!("handshake timeout after {elapsed:?}"),
                _ => format!("idle timeout after {elapsed:?}"),
            };

            self.close();
            actions.push(ConnectionAction::Close { reason });
            return actions;
        }

        if self.state == ConnectionState::Authenticated {
            let should_send = match self.last_heartbeat {
                None => true,
                Some(last) => now - last >= self.config.heartbeat_interval,
            };

            // Outbound heartbeats do not count as peer activity
            if should_send {
                actions.push(ConnectionAction::SendFrame(Frame::new(
                    FrameHeader::new(Opcode::Ping),
                    Vec::new(),
                )));
                self.last_heartbeat = Some(now);
            }
        }

        actions
    }

    /// Process an incoming session-layer frame.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::UnexpectedFrame` if opcode invalid for current state
    /// - `ConnectionError::InvalidPayload` if CBOR deserialization fails
    /// - `ConnectionError::UnsupportedVersion` if Hello version is not
    ///   [`PROTOCOL_VERSION`]
    /// - `ConnectionError::Protocol` if the connection id was not assigned
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.last_activity = now;

        let Some(opcode) = frame.header.opcode_enum() else {
            return Err(ConnectionError::UnexpectedFrame {
                state: self.state,
                opcode: frame.header.opcode(),
            });
        };

        match (self.state, opcode) {
            (ConnectionState::Init, Opcode::Hello) => {
                let Ok(Payload::Hello(hello)) = Payload::from_frame(frame) else {
                    return Err(ConnectionError::InvalidPayload {
                        expected: "Hello",
                        opcode: Opcode::Hello.to_u16(),
                    });
                };

                if hello.version != PROTOCOL_VERSION {
                    return Err(ConnectionError::UnsupportedVersion(hello.version));
                }

                let Some(connection_id) = self.connection_id else {
                    return Err(ConnectionError::Protocol(
                        "server must set connection_id before handling Hello".to_string(),
                    ));
                };

                self.caller_context = hello.auth_token;
                self.state = ConnectionState::Authenticated;

                let heartbeat_interval_ms =
                    u64::try_from(self.config.heartbeat_interval.as_millis()).unwrap_or(u64::MAX);
                let reply =
                    Payload::HelloReply(HelloReply { connection_id, heartbeat_interval_ms });
                let mut header = FrameHeader::new(Opcode::HelloReply);
                header.set_request_id(frame.header.request_id());

                Ok(vec![ConnectionAction::SendFrame(reply.into_frame(header)?)])
            },

            (ConnectionState::Authenticated, Opcode::Ping) => {
                let mut header = FrameHeader::new(Opcode::Pong);
                header.set_request_id(frame.header.request_id());
                Ok(vec![ConnectionAction::SendFrame(Frame::new(header, Vec::new()))])
            },

            // Activity already updated
            (ConnectionState::Authenticated, Opcode::Pong) => Ok(vec![]),

            (state, Opcode::Goodbye) if state != ConnectionState::Closed => {
                let Ok(Payload::Goodbye(goodbye)) = Payload::from_frame(frame) else {
                    return Err(ConnectionError::InvalidPayload {
                        expected: "Goodbye",
                        opcode: Opcode::Goodbye.to_u16(),
                    });
                };

                self.state = ConnectionState::Closed;

                let ack = Payload::Goodbye(Goodbye { reason: "ack".to_string() })
                    .into_frame(FrameHeader::new(Opcode::Goodbye))?;

                Ok(vec![ConnectionAction::SendFrame(ack), ConnectionAction::Close {
                    reason: format!("peer goodbye: {}", goodbye.reason),
                }])
            },

            (_, Opcode::Error) => {
                self.state = ConnectionState::Closed;
                Ok(vec![ConnectionAction::Close { reason: "peer error".to_string() }])
            },

            (state, opcode) => {
                Err(ConnectionError::UnexpectedFrame { state, opcode: opcode.to_u16() })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use trailhead_proto::payloads::session::Hello;

    use super::*;

    fn hello_frame(version: u8) -> Frame {
        Payload::Hello(Hello { version, auth_token: Some(b"token".to_vec()) })
            .into_frame(FrameHeader::new(Opcode::Hello))
            .unwrap()
    }

    fn authenticated(now: Instant) -> Connection {
        let mut conn = Connection::new(now, ConnectionConfig::default());
        conn.set_connection_id(0x1234);
        conn.handle_frame(&hello_frame(PROTOCOL_VERSION), now).unwrap();
        conn
    }

    #[test]
    fn hello_authenticates_and_replies() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.set_connection_id(0x1234_5678_9ABC_DEF0);

        let actions = conn.handle_frame(&hello_frame(PROTOCOL_VERSION), t0).unwrap();
        assert_eq!(conn.state(), ConnectionState::Authenticated);
        assert_eq!(conn.caller_context(), Some(&b"token"[..]));
        assert_eq!(actions.len(), 1);

        match &actions[0] {
            ConnectionAction::SendFrame(frame) => match Payload::from_frame(frame).unwrap() {
                Payload::HelloReply(reply) => {
                    assert_eq!(reply.connection_id, 0x1234_5678_9ABC_DEF0);
                    assert_eq!(reply.heartbeat_interval_ms, 20_000);
                },
                other => panic!("expected HelloReply, got {other:?}"),
            },
            other => panic!("expected SendFrame, got {other:?}"),
        }
    }

    #[test]
    fn hello_without_connection_id() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        let result = conn.handle_frame(&hello_frame(PROTOCOL_VERSION), t0);
        assert!(matches!(result, Err(ConnectionError::Protocol(_))));
    }

    #[test]
    fn hello_unsupported_version() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.set_connection_id(1);

        let result = conn.handle_frame(&hello_frame(99), t0);
        assert_eq!(result, Err(ConnectionError::UnsupportedVersion(99)));
        assert_eq!(conn.state(), ConnectionState::Init);
    }

    #[test]
    fn ping_before_handshake_is_rejected() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        let ping = Frame::new(FrameHeader::new(Opcode::Ping), Vec::new());
        let result = conn.handle_frame(&ping, t0);
        assert!(matches!(result, Err(ConnectionError::UnexpectedFrame { .. })));
    }

    #[test]
    fn ping_gets_pong() {
        let t0 = Instant::now();
        let mut conn = authenticated(t0);

        let mut header = FrameHeader::new(Opcode::Ping);
        header.set_request_id(9);
        let actions = conn.handle_frame(&Frame::new(header, Vec::new()), t0).unwrap();

        match &actions[..] {
            [ConnectionAction::SendFrame(frame)] => {
                assert_eq!(frame.header.opcode_enum(), Some(Opcode::Pong));
                assert_eq!(frame.header.request_id(), 9);
            },
            other => panic!("expected a single Pong, got {other:?}"),
        }
    }

    #[test]
    fn second_hello_is_rejected() {
        let t0 = Instant::now();
        let mut conn = authenticated(t0);

        let result = conn.handle_frame(&hello_frame(PROTOCOL_VERSION), t0);
        assert!(matches!(result, Err(ConnectionError::UnexpectedFrame { .. })));
    }

    #[test]
    fn goodbye_acks_and_closes() {
        let t0 = Instant::now();
        let mut conn = authenticated(t0);

        let goodbye = Payload::Goodbye(Goodbye { reason: "done".to_string() })
            .into_frame(FrameHeader::new(Opcode::Goodbye))
            .unwrap();
        let actions = conn.handle_frame(&goodbye, t0).unwrap();

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(actions[0], ConnectionAction::SendFrame(_)));
        assert!(matches!(actions[1], ConnectionAction::Close { .. }));
    }

    #[test]
    fn handshake_timeout_closes() {
        let t0 = Instant::now();
        let mut conn: Connection = Connection::new(t0, ConnectionConfig::default());

        assert!(conn.tick(t0 + Duration::from_secs(10)).is_empty());

        let actions = conn.tick(t0 + DEFAULT_HANDSHAKE_TIMEOUT + Duration::from_secs(1));
        assert!(matches!(actions[..], [ConnectionAction::Close { .. }]));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn heartbeat_then_idle_timeout() {
        let t0 = Instant::now();
        let mut conn = authenticated(t0);

        // First tick sends a heartbeat immediately
        let actions = conn.tick(t0);
        assert!(matches!(actions[..], [ConnectionAction::SendFrame(_)]));

        // Within the heartbeat interval nothing happens
        assert!(conn.tick(t0 + Duration::from_secs(5)).is_empty());

        // Next heartbeat due
        let actions = conn.tick(t0 + DEFAULT_HEARTBEAT_INTERVAL);
        assert!(matches!(actions[..], [ConnectionAction::SendFrame(_)]));

        // Peer never answered
        let actions = conn.tick(t0 + DEFAULT_IDLE_TIMEOUT + Duration::from_secs(1));
        assert!(matches!(actions[..], [ConnectionAction::Close { .. }]));
    }

    #[test]
    fn pong_keeps_connection_alive() {
        let t0 = Instant::now();
        let mut conn = authenticated(t0);

        let pong = Frame::new(FrameHeader::new(Opcode::Pong), Vec::new());
        let t1 = t0 + Duration::from_secs(50);
        assert!(conn.handle_frame(&pong, t1).unwrap().is_empty());

        assert!(conn.check_timeout(t1 + Duration::from_secs(30)).is_none());
    }
}
