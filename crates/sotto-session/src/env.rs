//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (time, randomness).
//! Test drivers supply a virtual clock and seeded RNG; production
//! drivers use [`SystemEnv`] (behind the `system` feature) with real
//! time and the OS CSPRNG.

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in
///   production (IVs and rotation salts come from it)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulation
    /// environments use virtual time.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::ops::Add<Duration, Output = Self::Instant>
        + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only
    /// be used by driver code (not session logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`, e.g. for file transfer ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Wall-clock time in Unix milliseconds, for message timestamps.
    ///
    /// Unlike `now()`, this is NOT monotonic (system clock can jump).
    /// Used only for human-facing timestamps, never for scheduling.
    fn wall_clock_ms(&self) -> u64;
}

/// Production environment using system time and cryptographic RNG.
///
/// Uses `std::time::Instant::now()` for time, `tokio::time::sleep()`
/// for async sleeping, and getrandom for cryptographic randomness.
///
/// # Panics
///
/// Panics if the OS RNG fails. This is intentional - a session without
/// functioning cryptographic randomness cannot operate securely, and
/// continuing would compromise every IV and rotation salt.
#[cfg(feature = "system")]
#[derive(Clone, Default)]
pub struct SystemEnv;

#[cfg(feature = "system")]
impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "system")]
impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - no secure IVs without it");
    }

    #[allow(clippy::expect_used)]
    fn wall_clock_ms(&self) -> u64 {
        let since_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)");
        u64::try_from(since_epoch.as_millis())
            .expect("invariant: wall clock fits in u64 milliseconds until year 584556")
    }
}
