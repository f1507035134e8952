//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (time, randomness). The
//! production server uses the OS clock and entropy; the simulation harness
//! uses a virtual clock and a seeded RNG so that every random turn pick and
//! generated player id can be replayed.

use std::{ops::Sub, time::Duration};

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, simulation
    /// environments use a virtual clock.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Current time (monotonic).
    ///
    /// # Invariants
    ///
    /// - Subsequent calls return times >= previous calls.
    fn now(&self) -> Self::Instant;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used for connection ids and player ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Uniform random value in `0..bound`.
    ///
    /// Rejection sampling avoids modulo bias. Returns 0 when `bound` is 0.
    fn random_below(&self, bound: u64) -> u64 {
        if bound <= 1 {
            return 0;
        }

        // Largest multiple of `bound` that fits in u64
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let candidate = self.random_u64();
            if candidate < zone {
                return candidate % bound;
            }
        }
    }
}
