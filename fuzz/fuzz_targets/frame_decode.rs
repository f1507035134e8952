//! Fuzz target for Frame::decode
//!
//! Feeds arbitrary bytes to the frame parser to find:
//! - Parser crashes or panics
//! - Integer overflows in size calculations
//! - Buffer over-reads past the claimed payload
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use trailhead_proto::{Frame, FrameHeader};

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        // A decoded frame never claims more than it carries
        assert_eq!(frame.payload.len(), frame.header.payload_size() as usize);
        assert!(FrameHeader::SIZE + frame.payload.len() <= data.len());
    }
});
