//! Capabilities of the messaging provider.
//!
//! The provider protocol itself lives outside this crate. A
//! [`SessionFactory`] opens [`Session`]s; each session exposes a
//! [`SessionClient`] for outbound requests and a channel of
//! [`SessionEvent`]s for everything the provider delivers.

use std::sync::Arc;

use async_trait::async_trait;
use herald_core::{GroupMetadata, Jid, OutboundContent, SessionEvent};
use tokio::sync::mpsc;

use crate::error::SessionError;

/// Outbound requests on a live session.
///
/// Shared across every task spawned for the session.
#[async_trait]
pub trait SessionClient: Send + Sync + 'static {
    /// Send a message to a chat.
    async fn send_message(&self, to: &Jid, content: OutboundContent) -> Result<(), SessionError>;

    /// Fetch group metadata.
    async fn group_metadata(&self, group: &Jid) -> Result<GroupMetadata, SessionError>;

    /// Profile picture location for a member.
    async fn profile_picture_url(&self, member: &Jid) -> Result<String, SessionError>;

    /// Remove members from a group.
    async fn remove_participants(&self, group: &Jid, members: &[Jid]) -> Result<(), SessionError>;

    /// Request a pairing code for linking `phone_number` without a QR scan.
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, SessionError>;

    /// Whether stored credentials are already registered with the provider.
    fn is_registered(&self) -> bool;

    /// The bot's own identity once known.
    fn own_id(&self) -> Option<Jid>;

    /// Persist updated credentials.
    async fn persist_credentials(&self) -> Result<(), SessionError>;

    /// Write the provider's local cache to disk.
    async fn write_cache_snapshot(&self) -> Result<(), SessionError>;
}

/// A session handed out by a [`SessionFactory`].
pub struct Session {
    /// Outbound request handle
    pub client: Arc<dyn SessionClient>,
    /// Lifecycle and inbound events, in delivery order
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Opens sessions with the provider.
#[async_trait]
pub trait SessionFactory: Send + 'static {
    /// Open a new session with the stored credentials.
    ///
    /// # Errors
    ///
    /// Any error is treated as a close event whose reason is
    /// [`SessionError::disconnect_reason`].
    async fn connect(&mut self) -> Result<Session, SessionError>;
}
