//! Virtual clock environment.

#![allow(clippy::disallowed_types, reason = "Locking simple clock state")]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use herald_core::Environment;

/// Environment with virtual time.
///
/// `sleep` advances the clock by the requested duration, records it and
/// yields once, so reconnect schedules can be asserted without waiting.
/// Clones share the clock.
#[derive(Clone, Default)]
pub struct SimEnv {
    clock: Arc<Mutex<SimClock>>,
}

#[derive(Default)]
struct SimClock {
    now: Duration,
    sleeps: Vec<Duration>,
}

impl SimEnv {
    /// Clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.clock.lock().map(|clock| clock.sleeps.clone()).unwrap_or_default()
    }

    /// Advance the clock without sleeping.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut clock) = self.clock.lock() {
            clock.now += duration;
        }
    }
}

impl Environment for SimEnv {
    type Instant = Duration;

    fn now(&self) -> Self::Instant {
        self.clock.lock().map(|clock| clock.now).unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        if let Ok(mut clock) = self.clock.lock() {
            clock.now += duration;
            clock.sleeps.push(duration);
        }
        tokio::task::yield_now()
    }
}
