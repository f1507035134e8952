//! Deterministic simulation harness for Trailhead session testing.
//!
//! [`SimEnv`] replaces the OS clock and entropy with a virtual clock and a
//! seeded RNG, so random turn picks, player ids and vote deadlines replay
//! exactly. [`SimServer`] wraps the Sans-IO [`trailhead_server::ServerDriver`]
//! and records the frames each connection would have received.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the session
//! invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    BallotsFromMembers, Invariant, InvariantRegistry, InvariantResult, NoEmptySessions,
    OpenVoteBelowQuorum, PlayerSnapshot, SessionSnapshot, SystemSnapshot, TurnPointerInRange,
    UniqueConnections, UniqueNames, Violation,
};
pub use sim_env::SimEnv;
pub use sim_server::{SimServer, SimServerError};
