//! Fuzz target for Payload::from_frame
//!
//! The first two input bytes pick the opcode (known or not), the rest is the
//! payload. Covers malformed CBOR, type confusion between opcodes and
//! oversized strings inside otherwise valid structures.
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use trailhead_proto::{Frame, FrameHeader, Opcode, Payload};

fuzz_target!(|data: &[u8]| {
    let Some((opcode_bytes, body)) = data.split_first_chunk::<2>() else {
        return;
    };
    let raw = u16::from_be_bytes(*opcode_bytes);

    let Some(opcode) = Opcode::from_u16(raw) else {
        let frame = Frame::new(FrameHeader::new(Opcode::Chat), body.to_vec());
        let _ = Payload::decode(Opcode::Chat, &frame.payload);
        return;
    };

    let frame = Frame::new(FrameHeader::new(opcode), body.to_vec());
    if let Ok(payload) = Payload::from_frame(&frame) {
        assert_eq!(payload.opcode(), opcode);
    }
});
