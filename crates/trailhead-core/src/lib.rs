//! Trailhead core: sans-IO game session logic.
//!
//! Everything here is a pure state machine. Operations take the current time
//! and an [`env::Environment`] for randomness as inputs and return events or
//! actions for a driver to execute; nothing in this crate touches a socket or
//! a clock directly.
//!
//! # Layers
//!
//! - [`connection`]: per-connection session layer (handshake, heartbeat,
//!   timeouts)
//! - [`roster`], [`turn`], [`vote`]: the pieces a game session is made of
//! - [`session`]: the aggregate applying lobby, turn and vote operations

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod player;
pub mod roster;
pub mod session;
pub mod turn;
pub mod vote;

pub use error::{ConnectionError, SessionError};
pub use player::{ConnectionId, Player, PlayerId};
pub use session::{Session, SessionConfig, SessionEvent};
pub use vote::VoteDeadline;
