//! Events delivered by a live session.

use serde::{Deserialize, Serialize};

use crate::{membership::RawParticipantsUpdate, message::RawMessage, session::LifecycleEvent};

/// Contact record synced from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact identifier
    pub id: String,
    /// Name the contact chose for themselves
    pub notify: Option<String>,
}

/// Non-lifecycle events delivered by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// New or updated messages
    MessagesUpsert(Vec<RawMessage>),
    /// Group membership changed
    ParticipantsUpdate(RawParticipantsUpdate),
    /// Contacts added or changed
    ContactsSync(Vec<Contact>),
    /// Session credentials changed and should be persisted
    CredentialsUpdate,
}

/// Everything a session emits, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connection lifecycle signal
    Lifecycle(LifecycleEvent),
    /// Message, membership, contact or credential event
    Inbound(InboundEvent),
}

impl From<LifecycleEvent> for SessionEvent {
    fn from(event: LifecycleEvent) -> Self {
        Self::Lifecycle(event)
    }
}

impl From<InboundEvent> for SessionEvent {
    fn from(event: InboundEvent) -> Self {
        Self::Inbound(event)
    }
}
