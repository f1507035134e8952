//! Session-layer payloads: handshake and graceful shutdown.

use serde::{Deserialize, Serialize};

/// Client handshake.
///
/// `auth_token` is the credential issued by the external identity service.
/// The gateway does not interpret it; it is kept as the opaque, already
/// verified caller context of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the client speaks
    pub version: u8,
    /// Opaque caller credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<Vec<u8>>,
}

/// Server handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Connection identifier assigned by the server. Changes on every
    /// reconnect.
    pub connection_id: u64,
    /// Interval at which the server expects traffic, in milliseconds
    pub heartbeat_interval_ms: u64,
}

/// Graceful disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Human-readable reason
    pub reason: String,
}
