//! Environment abstraction for deterministic testing.
//!
//! Decouples supervision logic from system resources (time, sleeping). The
//! production runtime uses the tokio clock, the simulation harness records
//! sleeps without waiting so reconnect schedules can be asserted exactly.

use std::time::Duration;

/// Abstract environment providing time and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `sleep()` completes once the duration has elapsed in the environment's
///   notion of time (virtual time may elapse instantly)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use a virtual clock.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code may sleep. The state machines receive time as input.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}
