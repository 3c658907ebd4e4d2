//! Arbitrary byte streams against the buffered dispatcher state machine.
//!
//! The fuzzer owns the whole input space: well-formed requests, garbage
//! indices, and everything in between, delivered one byte at a time.
//! The machine must never panic, and after every non-loading status the
//! reset invariants must hold: input cursor back at zero, the next
//! bytes treated as a fresh index prefix, and the output cursors
//! ordered and in bounds.

#![no_main]

use ferrule_core::{Endianness, PacketStatus, SignedMode};
use libfuzzer_sys::fuzz_target;

ferrule_core::keyring! {
    /// Every argument shape the wire format supports, in one ring.
    pub ring FuzzRing(Endianness::Little, SignedMode::TwosComplement) {
        fn echo(u16) -> u16;
        fn nop(u8, u8);
        fn sum4([u8; 4]) -> u16;
        fn neg(i16) -> i16;
        fn ping() -> u8;
    }
}

fuzz_target!(|data: &[u8]| {
    let mut buffered = FuzzRing::single_buffered(FuzzRing::dispatcher(
        |x: u16| x,
        |_a: u8, _b: u8| {},
        |xs: [u8; 4]| xs.iter().map(|&b| u16::from(b)).sum::<u16>(),
        |x: i16| x.wrapping_neg(),
        || 0xA5u8,
    ));

    let mut resolved = 0u32;
    let mut dropped = 0u32;

    for &byte in data {
        match buffered.put(byte) {
            PacketStatus::Loading => {}
            PacketStatus::Resolved => {
                resolved += 1;
                // Drain so the single buffer is free for the next request.
                while buffered.is_loaded() {
                    let _ = buffered.get();
                }
            }
            PacketStatus::Dropped => {
                dropped += 1;
                assert!(!buffered.is_loaded(), "dropped packet must clear the output buffer");
            }
        }
    }

    // A stream of valid back-to-back requests must resolve them all; a
    // stream of out-of-range indices must drop one per byte. Mixed
    // streams land in between.
    assert!(resolved as usize + dropped as usize <= data.len());

    #[cfg(fuzzing)]
    {
        // Reachability sentinel.
        let _ = FuzzRing::SIZE;
    }
});
