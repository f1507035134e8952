//! Trailhead wire protocol.
//!
//! Every message on the wire is a [`Frame`]: a fixed 16-byte binary header
//! followed by a CBOR-encoded payload. The header carries just enough to route
//! and size a frame (magic, version, opcode, request id, payload length), so
//! the gateway can reject garbage before touching CBOR.
//!
//! # Layers
//!
//! - [`FrameHeader`]: zero-copy header parsing and validation
//! - [`Frame`]: header + raw payload bytes
//! - [`Payload`]: typed message enum, one variant per [`Opcode`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use payloads::{ErrorPayload, Payload};

/// ALPN protocol identifier negotiated during the QUIC handshake.
pub const ALPN_PROTOCOL: &[u8] = b"trailhead/1";
