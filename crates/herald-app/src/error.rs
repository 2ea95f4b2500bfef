//! Runtime error types.
//!
//! One error enum per capability boundary:
//! - [`SessionError`]: calls into the session client (network I/O)
//! - [`StoreError`]: group configuration and contact storage
//! - [`HandlerError`]: command and event handlers
//! - [`AutomationError`]: group membership automation
//! - [`PluginError`]: plugin discovery and registration
//! - [`RuntimeError`]: the supervisor runtime itself

use std::path::PathBuf;

use herald_core::{DisconnectReason, RegistryError, SupervisorError};
use thiserror::Error;

/// Errors from the session client capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Could not establish a session.
    ///
    /// Transient - the supervisor reconnects.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The session is closed.
    ///
    /// Transient or terminal depending on `reason`.
    #[error("session closed: {reason}")]
    Closed {
        /// Classified close reason
        reason: DisconnectReason,
    },

    /// A request on a live session failed (send, metadata, picture).
    ///
    /// Contained by the component that made the request.
    #[error("request failed: {0}")]
    Request(String),

    /// The session implementation does not support this request.
    #[error("unsupported request: {0}")]
    Unsupported(&'static str),
}

impl SessionError {
    /// Close reason to feed the supervisor when connecting fails with this
    /// error.
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            Self::Closed { reason } => *reason,
            Self::Connect(_) => DisconnectReason::TransientNetwork,
            Self::Request(_) | Self::Unsupported(_) => DisconnectReason::Unknown,
        }
    }
}

/// Errors from storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend I/O failed. May be transient.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Stored record could not be encoded or decoded. Not transient.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors returned by handlers.
///
/// Caught at the dispatch boundary; never propagate past the router.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Session request failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Storage request failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Handler panicked
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Handler task was cancelled before completing
    #[error("handler cancelled")]
    Cancelled,

    /// Any other handler failure
    #[error("{0}")]
    Failed(String),
}

/// Errors while automating one member of a membership event.
///
/// Logged per member; the remaining members are still processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    /// Metadata fetch, send or removal failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Group settings lookup failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from plugin loading.
///
/// A failing plugin is logged and skipped; loading continues.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Plugin source could not be read
    #[error("cannot read {path}: {reason}")]
    Io {
        /// File or directory
        path: PathBuf,
        /// OS error text
        reason: String,
    },

    /// Plugin definition is malformed
    #[error("invalid plugin {path}: {reason}")]
    Invalid {
        /// File the definition came from
        path: PathBuf,
        /// Parser error text
        reason: String,
    },

    /// A descriptor was rejected by the registry
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors that stop the supervisor runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Supervisor state machine rejected a transition. Indicates a bug.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// A close produced no reconnect or terminate decision. Indicates a bug.
    #[error("close event produced no transition")]
    NoTransition,
}
