//! Herald core
//!
//! Sans-IO logic for a long-running messaging bot: connection supervision,
//! inbound event normalization, command routing data structures and group
//! membership policy. Nothing here performs I/O; the async runtime in
//! `herald-app` feeds events in and executes the resulting actions.
//!
//! # Components
//!
//! - [`session::Supervisor`]: connect → open → closed → reconnect | terminate
//! - [`message::normalize`]: raw provider message → [`message::InboundMessage`]
//! - [`command::CommandRegistry`]: name and alias lookup for handlers
//! - [`membership`]: membership events, group configuration, notice rendering
//! - [`antifraud::AntiFraudPolicy`]: calling code denylist

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod antifraud;
pub mod command;
pub mod content;
pub mod env;
pub mod error;
pub mod event;
pub mod jid;
pub mod membership;
pub mod message;
pub mod session;

pub use antifraud::{AntiFraudPolicy, Verdict};
pub use command::{
    CommandDescriptor, CommandRegistry, Entry, EventKind, HandlerId, Invocation, Registration,
};
pub use content::OutboundContent;
pub use env::Environment;
pub use error::{RegistryError, SupervisorError};
pub use event::{Contact, InboundEvent, SessionEvent};
pub use jid::Jid;
pub use membership::{
    GroupConfig, GroupConfigUpdate, GroupMetadata, MembershipAction, MembershipEvent, Notice,
    RawParticipantsUpdate,
};
pub use message::{InboundMessage, MessageContent, MessageKey, RawMessage};
pub use session::{
    DisconnectReason, LifecycleEvent, ReconnectPolicy, SessionState, Supervisor, SupervisorAction,
};
