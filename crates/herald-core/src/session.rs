//! Connection supervision state machine.
//!
//! Governs the lifecycle of the single live session: connect, open, close and
//! the decision between reconnecting and terminating. Uses the action pattern:
//! lifecycle events go in, [`SupervisorAction`]s come out for the runtime to
//! execute. The state machine performs no I/O.
//!
//! # State Machine
//!
//! ```text
//! ┌────────────┐   Open    ┌──────┐   Close    ┌────────┐
//! │ Connecting │──────────>│ Open │───────────>│ Closed │
//! └────────────┘           └──────┘            └────────┘
//!       ↑  │                                    │      │
//!       │  │ Close (connect failed)             │      │ terminal reason
//!       │  └───────────────────────────────────>│      ↓
//!       │            reconnecting()             │  ┌────────────┐
//!       └───────────────────────────────────────┘  │ Terminated │
//!                                                   └────────────┘
//! ```

use std::{fmt, time::Duration};

use crate::error::SupervisorError;

/// Upper bound for the exponential reconnect delay when backoff is enabled.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Session state. Exactly one per supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection attempt in progress
    Connecting,
    /// Session is live
    Open,
    /// Session closed, waiting for the runtime to reconnect
    Closed,
    /// Session closed for good, human intervention required
    Terminated,
}

/// Classified cause of a close event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Stored credentials are corrupt or unusable
    BadSession,
    /// Another session was opened with the same credentials
    Replaced,
    /// The device was logged out remotely
    LoggedOut,
    /// Connection lost, closed or timed out
    TransientNetwork,
    /// The server asked for a fresh connection
    RestartRequired,
    /// Anything the provider did not classify
    Unknown,
}

impl DisconnectReason {
    /// Classify a provider status code.
    pub fn from_status_code(code: Option<u16>) -> Self {
        match code {
            Some(500) => Self::BadSession,
            Some(401) => Self::LoggedOut,
            Some(440) => Self::Replaced,
            Some(515) => Self::RestartRequired,
            Some(408 | 428) => Self::TransientNetwork,
            _ => Self::Unknown,
        }
    }

    /// Terminal reasons need re-authentication and are never retried.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::BadSession | Self::Replaced | Self::LoggedOut)
    }

    /// Operator hint logged when the session terminates for this reason.
    pub fn remediation(self) -> &'static str {
        match self {
            Self::BadSession => "bad session file, delete the auth directory and pair again",
            Self::LoggedOut => "device logged out, delete the auth directory and pair again",
            Self::Replaced => "another session was opened, close it before restarting",
            Self::TransientNetwork | Self::RestartRequired | Self::Unknown => "reconnecting",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BadSession => "bad session",
            Self::Replaced => "connection replaced",
            Self::LoggedOut => "logged out",
            Self::TransientNetwork => "network failure",
            Self::RestartRequired => "restart required",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Lifecycle signals emitted by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Session authenticated and ready
    Open,
    /// Session closed
    Close {
        /// Classified cause
        reason: DisconnectReason,
        /// Provider error text, if any
        detail: Option<String>,
    },
}

/// Delay schedule between reconnect attempts.
///
/// A zero `base_delay` retries immediately, relying on the transport's own
/// backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry; doubles for each consecutive failure
    pub base_delay: Duration,
    /// Cap for the doubled delay
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::ZERO, max_delay: DEFAULT_MAX_RECONNECT_DELAY }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Actions returned by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Run post-connect work (plugin loading, owner notice) for this
    /// connection. Emitted at most once per connection.
    RunStartup {
        /// Connection the startup belongs to
        connection_id: u64,
        /// Whether this is the first connection that ever opened
        first: bool,
    },

    /// Request a new session from the factory after `delay`.
    Reconnect {
        /// Consecutive failed connections, 1-based
        attempt: u32,
        /// Delay before invoking the factory
        delay: Duration,
        /// Why the previous session closed
        reason: DisconnectReason,
    },

    /// Stop supervising and halt.
    Terminate {
        /// Terminal close reason
        reason: DisconnectReason,
    },
}

/// Connection supervisor state machine.
///
/// Pure state machine: the runtime feeds lifecycle events and executes the
/// returned actions.
#[derive(Debug, Clone)]
pub struct Supervisor {
    /// Current state
    state: SessionState,
    /// Reconnect delay schedule
    policy: ReconnectPolicy,
    /// Monotonic connection counter, starts at 1
    connection_id: u64,
    /// Connection for which startup already ran
    startup_ran_for: Option<u64>,
    /// Whether any connection ever opened
    ever_opened: bool,
    /// Closes since the last successful open
    consecutive_failures: u32,
    /// Total reconnects requested
    reconnects: u64,
    /// Cause of the most recent close
    last_disconnect: Option<DisconnectReason>,
}

impl Supervisor {
    /// Create a supervisor for the first connection attempt.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: SessionState::Connecting,
            policy,
            connection_id: 1,
            startup_ran_for: None,
            ever_opened: false,
            consecutive_failures: 0,
            reconnects: 0,
            last_disconnect: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identifier of the current connection attempt.
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Total reconnects requested so far.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects
    }

    /// Cause of the most recent close. `None` before the first close.
    pub fn last_disconnect(&self) -> Option<DisconnectReason> {
        self.last_disconnect
    }

    /// Process a lifecycle event from the current session.
    ///
    /// # Errors
    ///
    /// - `SupervisorError::InvalidState` for `Open` after the session closed,
    ///   and for any event once terminated
    pub fn handle(
        &mut self,
        event: LifecycleEvent,
    ) -> Result<Vec<SupervisorAction>, SupervisorError> {
        match (self.state, event) {
            (SessionState::Connecting, LifecycleEvent::Open) => {
                self.state = SessionState::Open;
                self.consecutive_failures = 0;
                Ok(self.startup_once())
            },

            // Duplicate open for the same connection
            (SessionState::Open, LifecycleEvent::Open) => Ok(self.startup_once()),

            (
                SessionState::Connecting | SessionState::Open,
                LifecycleEvent::Close { reason, .. },
            ) => {
                self.state = SessionState::Closed;
                self.last_disconnect = Some(reason);

                if reason.is_terminal() {
                    self.state = SessionState::Terminated;
                    return Ok(vec![SupervisorAction::Terminate { reason }]);
                }

                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.reconnects += 1;
                let attempt = self.consecutive_failures;
                Ok(vec![SupervisorAction::Reconnect {
                    attempt,
                    delay: self.policy.delay_for(attempt),
                    reason,
                }])
            },

            // Duplicate close, reconnect already requested
            (SessionState::Closed, LifecycleEvent::Close { .. }) => Ok(vec![]),

            (state @ (SessionState::Closed | SessionState::Terminated), LifecycleEvent::Open) => {
                Err(SupervisorError::InvalidState { state, operation: "handle open" })
            },

            (SessionState::Terminated, LifecycleEvent::Close { .. }) => {
                Err(SupervisorError::InvalidState {
                    state: SessionState::Terminated,
                    operation: "handle close",
                })
            },
        }
    }

    /// Mark that the runtime invoked the factory for a new session.
    ///
    /// # Errors
    ///
    /// - `SupervisorError::InvalidState` if not in `Closed` state
    pub fn reconnecting(&mut self) -> Result<(), SupervisorError> {
        if self.state != SessionState::Closed {
            return Err(SupervisorError::InvalidState { state: self.state, operation: "reconnect" });
        }

        self.state = SessionState::Connecting;
        self.connection_id += 1;
        Ok(())
    }

    fn startup_once(&mut self) -> Vec<SupervisorAction> {
        if self.startup_ran_for == Some(self.connection_id) {
            return vec![];
        }

        let first = !self.ever_opened;
        self.startup_ran_for = Some(self.connection_id);
        self.ever_opened = true;
        vec![SupervisorAction::RunStartup { connection_id: self.connection_id, first }]
    }
}
