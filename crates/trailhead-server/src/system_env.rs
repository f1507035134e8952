//! Production Environment implementation using system time and RNG.
//!
//! Real time advances naturally and randomness comes from the OS
//! cryptographic RNG (getrandom), so turn picks and connection ids are not
//! reproducible. Tests use the harness `SimEnv` instead.

use trailhead_core::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. Connection ids and player ids must not be
/// guessable, and there is no meaningful fallback.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
