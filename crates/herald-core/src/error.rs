//! Error types for the Herald core.
//!
//! Strongly-typed errors for the supervision state machine and command
//! registration. Runtime errors (network, storage, handlers) live in
//! `herald-app` next to the capabilities that produce them.

use thiserror::Error;

use crate::session::SessionState;

/// Errors from the connection supervisor state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: SessionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

/// Errors from command registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Command patterns must be non-empty and free of whitespace.
    #[error("invalid command pattern {0:?}")]
    InvalidPattern(String),
}
