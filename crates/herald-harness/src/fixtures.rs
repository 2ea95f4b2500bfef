//! Builders for provider events.

use herald_core::{
    Contact, DisconnectReason, GroupMetadata, InboundEvent, Jid, LifecycleEvent, MessageContent,
    MessageKey, RawMessage, RawParticipantsUpdate, SessionEvent, jid::USER_SERVER,
};

/// Full user identifier for a bare number.
pub fn user(number: &str) -> String {
    format!("{number}@{USER_SERVER}")
}

/// Text message in a private chat.
pub fn private_text(from: &str, id: &str, body: &str) -> RawMessage {
    RawMessage {
        key: MessageKey {
            remote_jid: from.to_string(),
            from_me: false,
            id: id.to_string(),
            participant: None,
        },
        push_name: Some("Tester".to_string()),
        content: Some(MessageContent::Conversation(body.to_string())),
    }
}

/// Text message in a group chat.
pub fn group_text(group: &str, sender: &str, id: &str, body: &str) -> RawMessage {
    RawMessage {
        key: MessageKey {
            remote_jid: group.to_string(),
            from_me: false,
            id: id.to_string(),
            participant: Some(sender.to_string()),
        },
        push_name: Some("Tester".to_string()),
        content: Some(MessageContent::Conversation(body.to_string())),
    }
}

/// Image with a caption in a private chat.
pub fn private_image(from: &str, id: &str, caption: &str) -> RawMessage {
    RawMessage {
        content: Some(MessageContent::Image { caption: Some(caption.to_string()) }),
        ..private_text(from, id, "")
    }
}

/// Strip the sender's push name.
pub fn anonymous(mut message: RawMessage) -> RawMessage {
    message.push_name = None;
    message
}

/// Mark a message as sent by the bot's own account.
pub fn from_me(mut message: RawMessage) -> RawMessage {
    message.key.from_me = true;
    message
}

/// Messages upsert event.
pub fn upsert(messages: Vec<RawMessage>) -> InboundEvent {
    InboundEvent::MessagesUpsert(messages)
}

/// Membership update event.
pub fn participants(group: &str, action: &str, members: &[&str]) -> InboundEvent {
    InboundEvent::ParticipantsUpdate(RawParticipantsUpdate {
        id: group.to_string(),
        participants: members.iter().map(|m| (*m).to_string()).collect(),
        action: action.to_string(),
    })
}

/// Contact sync event.
pub fn contacts(entries: &[(&str, Option<&str>)]) -> InboundEvent {
    InboundEvent::ContactsSync(
        entries
            .iter()
            .map(|(id, name)| Contact { id: (*id).to_string(), notify: name.map(str::to_string) })
            .collect(),
    )
}

/// Session opened.
pub fn open() -> SessionEvent {
    SessionEvent::Lifecycle(LifecycleEvent::Open)
}

/// Session closed for `reason`.
pub fn close(reason: DisconnectReason) -> SessionEvent {
    SessionEvent::Lifecycle(LifecycleEvent::Close { reason, detail: None })
}

/// Inbound event as a session event.
pub fn inbound(event: InboundEvent) -> SessionEvent {
    SessionEvent::Inbound(event)
}

/// Metadata for a group with `members` generated participants.
pub fn group_metadata(id: &str, subject: &str, members: usize) -> GroupMetadata {
    GroupMetadata {
        id: Jid::new(id),
        subject: subject.to_string(),
        description: None,
        participants: (0..members).map(|n| Jid::user(&format!("1000{n}"))).collect(),
    }
}
