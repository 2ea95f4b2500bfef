//! Deterministic simulation harness for Herald.
//!
//! Test doubles for the provider boundary so the supervisor, router and
//! automation engine can be driven end to end without a network:
//!
//! - [`SimEnv`]: virtual clock; sleeps advance time instantly and are
//!   recorded
//! - [`SimClient`]: session client that records every outbound request and
//!   serves scripted metadata, pictures and failures
//! - [`SimFactory`]: hands out scripted sessions in order
//! - [`fixtures`]: builders for provider events

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod sim_client;
pub mod sim_env;
pub mod sim_factory;

pub use sim_client::{SentMessage, SimClient};
pub use sim_env::SimEnv;
pub use sim_factory::{SessionScript, SimFactory};
