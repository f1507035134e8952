//! Fuzz target for the session driver.
//!
//! Drives a simulated server with arbitrary client operations, including
//! raw frames that skip the handshake or carry garbage payloads.
//!
//! # Invariants
//!
//! - The driver never returns an error for a registered connection
//! - Turn pointer stays in range, names and connections stay unique
//! - Ballots only come from present players; a full quorum never stays open
//! - Empty sessions are evicted

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trailhead_core::{SessionConfig, VoteDeadline};
use trailhead_harness::{InvariantRegistry, SimServer};
use trailhead_proto::{Frame, FrameHeader, Opcode, Payload, payloads::lobby::NextTurn};
use trailhead_server::DriverConfig;

const KEYS: [&str; 2] = ["L1", "L2"];
const NAMES: [&str; 4] = ["A", "B", "C", "D"];

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: u64,
    deadline: DeadlineChoice,
    ops: Vec<FuzzOp>,
}

#[derive(Debug, Clone, Arbitrary)]
enum DeadlineChoice {
    Disabled,
    Cancel(u8),
    Resolve(u8),
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzOp {
    Join { conn: u8, key: u8, name: u8 },
    Leave { conn: u8, key: u8 },
    GetSession { conn: u8, key: u8 },
    Disconnect { conn: u8 },
    StartGame { conn: u8, key: u8 },
    EndTurn { conn: u8, key: u8 },
    NextTurn { conn: u8, key: u8, name: u8 },
    StartVote { conn: u8, key: u8, target: u8 },
    CastVote { conn: u8, key: u8, voter: u8, choice: u8 },
    RawFrame { conn: u8, opcode: u16, body: Vec<u8> },
    Wait { secs: u8 },
}

fn conn_id(conn: u8) -> u64 {
    u64::from(conn % 5) + 1
}

fn key(k: u8) -> &'static str {
    KEYS[usize::from(k) % KEYS.len()]
}

fn name(n: u8) -> &'static str {
    NAMES[usize::from(n) % NAMES.len()]
}

fn ensure_connected(server: &mut SimServer, conn: u64) {
    if !server.driver().registry().has_connection(conn) {
        server.connect(conn).unwrap();
    }
}

fuzz_target!(|scenario: Scenario| {
    let vote_deadline = match scenario.deadline {
        DeadlineChoice::Disabled => VoteDeadline::Disabled,
        DeadlineChoice::Cancel(s) => VoteDeadline::Cancel(Duration::from_secs(u64::from(s))),
        DeadlineChoice::Resolve(s) => {
            VoteDeadline::ResolveWithAbstentions(Duration::from_secs(u64::from(s)))
        },
    };
    let config = DriverConfig { session: SessionConfig { vote_deadline }, ..Default::default() };
    let mut server = SimServer::with_seed(scenario.seed, config);
    let invariants = InvariantRegistry::standard();

    for op in scenario.ops.iter().take(256) {
        match op {
            FuzzOp::Join { conn, key: k, name: n } => {
                let conn = conn_id(*conn);
                ensure_connected(&mut server, conn);
                server.join(conn, key(*k), name(*n)).unwrap();
            },
            FuzzOp::Leave { conn, key: k } => {
                let conn = conn_id(*conn);
                ensure_connected(&mut server, conn);
                server.leave(conn, key(*k)).unwrap();
            },
            FuzzOp::GetSession { conn, key: k } => {
                let conn = conn_id(*conn);
                ensure_connected(&mut server, conn);
                server.get_session(conn, key(*k)).unwrap();
            },
            FuzzOp::Disconnect { conn } => {
                let conn = conn_id(*conn);
                if server.driver().registry().has_connection(conn) {
                    server.disconnect(conn).unwrap();
                }
            },
            FuzzOp::StartGame { conn, key: k } => {
                let conn = conn_id(*conn);
                ensure_connected(&mut server, conn);
                server.start_game(conn, key(*k)).unwrap();
            },
            FuzzOp::EndTurn { conn, key: k } => {
                let conn = conn_id(*conn);
                ensure_connected(&mut server, conn);
                server.end_turn(conn, key(*k)).unwrap();
            },
            FuzzOp::NextTurn { conn, key: k, name: n } => {
                let conn = conn_id(*conn);
                ensure_connected(&mut server, conn);
                let payload = Payload::NextTurn(NextTurn {
                    session_key: key(*k).to_string(),
                    player_name: name(*n).to_string(),
                });
                server.send(conn, payload).unwrap();
            },
            FuzzOp::StartVote { conn, key: k, target } => {
                let conn = conn_id(*conn);
                ensure_connected(&mut server, conn);
                server.start_vote(conn, key(*k), name(*target)).unwrap();
            },
            FuzzOp::CastVote { conn, key: k, voter, choice } => {
                let conn = conn_id(*conn);
                ensure_connected(&mut server, conn);
                server.cast_vote(conn, key(*k), name(*voter), name(*choice)).unwrap();
            },
            FuzzOp::RawFrame { conn, opcode, body } => {
                let conn = conn_id(*conn);
                if !server.driver().registry().has_connection(conn) {
                    server.accept(conn).unwrap();
                }
                // Patch the opcode on the wire so unknown values get through
                let frame = Frame::new(FrameHeader::new(Opcode::Chat), body.clone());
                let mut wire = frame.to_vec().unwrap();
                wire[6..8].copy_from_slice(&opcode.to_be_bytes());
                let Ok(frame) = Frame::decode(&wire) else {
                    continue;
                };
                server.send_frame(conn, frame).unwrap();
            },
            FuzzOp::Wait { secs } => {
                server.advance(Duration::from_secs(u64::from(*secs))).unwrap();
            },
        }

        invariants.assert_all(&server.snapshot(), &format!("after {op:?}"));
    }
});
