//! Production Environment implementation using the system clock.
//!
//! Time advances naturally and sleeps wait on the tokio timer, so reconnect
//! backoff is wall-clock real.

use std::time::Duration;

use herald_core::Environment;

/// Production environment backed by `std::time::Instant` and
/// `tokio::time::sleep()`.
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

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
