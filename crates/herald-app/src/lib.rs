//! Herald runtime
//!
//! Async glue between the sans-IO core and a messaging provider:
//!
//! - [`ConnectionSupervisor`]: keeps one session alive, reconnecting on
//!   transient failures and halting on terminal ones
//! - [`EventRouter`]: routes inbound events to command and passive handlers,
//!   group automation and the stores
//! - [`GroupAutomationEngine`]: welcome, goodbye, role notices and anti-fraud
//!   removal
//! - [`plugins`]: built-in commands and JSON manifest plugins
//! - [`store`]: group settings and contacts, in memory or in redb
//!
//! The provider protocol is behind [`SessionFactory`] and [`SessionClient`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod automation;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod plugins;
pub mod router;
pub mod store;
pub mod supervisor;
pub mod system_env;

pub use automation::{AutomationReport, GroupAutomationEngine, MemberOutcome};
pub use client::{Session, SessionClient, SessionFactory};
pub use config::BotConfig;
pub use error::{
    AutomationError, HandlerError, PluginError, RuntimeError, SessionError, StoreError,
};
pub use handler::{DynHandler, Handler, HandlerContext, HandlerRegistry, handler_fn};
pub use router::{CommandOutcome, DispatchReport, EventReport, EventRouter, PassiveOutcome};
pub use store::{
    ChaoticStore, ContactRecord, ContactStore, GroupConfigStore, MemoryStore, RedbStore, StoreOp,
};
pub use supervisor::{ConnectionSupervisor, Termination, write_snapshots};
pub use system_env::SystemEnv;
