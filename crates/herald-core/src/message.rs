//! Inbound message normalization.
//!
//! The provider delivers loosely structured payloads ([`RawMessage`]). They are
//! normalized once, at the boundary, into an immutable [`InboundMessage`] so
//! that routing and handlers never inspect provider payload shape.

use crate::jid::Jid;

/// Provider key identifying a message and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKey {
    /// Chat the message belongs to (user, group or broadcast channel)
    pub remote_jid: String,
    /// Sent by this session's own account
    pub from_me: bool,
    /// Provider message ID
    pub id: String,
    /// Author inside a group chat
    pub participant: Option<String>,
}

/// Provider message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text
    Conversation(String),
    /// Text with link previews, quotes or mentions
    ExtendedText {
        /// Message text
        text: String,
    },
    /// Image with optional caption
    Image {
        /// Caption text
        caption: Option<String>,
    },
    /// Video with optional caption
    Video {
        /// Caption text
        caption: Option<String>,
    },
    /// Disappearing-message envelope
    Ephemeral(Box<MessageContent>),
    /// View-once envelope
    ViewOnce(Box<MessageContent>),
    /// Any content kind without extractable text (stickers, reactions, ...)
    Other {
        /// Provider content kind
        kind: String,
    },
}

impl MessageContent {
    /// Innermost content with all wrapper envelopes removed.
    pub fn innermost(&self) -> &Self {
        let mut content = self;
        while let Self::Ephemeral(inner) | Self::ViewOnce(inner) = content {
            content = &**inner;
        }
        content
    }

    /// Typed text only. Empty for media and unknown content.
    pub fn text(&self) -> &str {
        match self.innermost() {
            Self::Conversation(text) | Self::ExtendedText { text } => text.as_str(),
            _ => "",
        }
    }

    /// Any extractable text: typed text or a media caption.
    pub fn body(&self) -> &str {
        match self.innermost() {
            Self::Conversation(text) | Self::ExtendedText { text } => text.as_str(),
            Self::Image { caption } | Self::Video { caption } => caption.as_deref().unwrap_or(""),
            _ => "",
        }
    }
}

/// Message as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Routing key
    pub key: MessageKey,
    /// Sender's self-chosen display name
    pub push_name: Option<String>,
    /// Content. `None` for protocol-only messages.
    pub content: Option<MessageContent>,
}

/// Display name used when the sender has none.
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Normalized inbound message.
///
/// Created once per provider message and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Provider message ID
    pub id: String,
    /// Chat the message belongs to
    pub chat: Jid,
    /// Author of the message
    pub sender: Jid,
    /// Whether `chat` is a group
    pub is_group: bool,
    /// Sent by this session's own account
    pub from_me: bool,
    /// Sender display name
    pub display_name: String,
    /// Any extractable text (typed text or caption)
    pub body: String,
    /// Typed text only
    pub text: String,
    /// Original provider payload, opaque to routing
    pub raw: RawMessage,
}

/// Normalize a raw provider message.
///
/// Returns `None` for messages that must not reach handlers: messages without
/// content and messages addressed to the status broadcast channel. `own_id`
/// attributes messages sent by this account.
pub fn normalize(raw: RawMessage, own_id: Option<&Jid>) -> Option<InboundMessage> {
    let content = raw.content.as_ref()?;

    let chat = Jid::new(&raw.key.remote_jid);
    if chat.is_status_broadcast() {
        return None;
    }

    let is_group = chat.is_group();
    let sender = if raw.key.from_me {
        own_id.cloned().unwrap_or_else(|| chat.clone())
    } else if is_group {
        raw.key.participant.as_deref().map_or_else(|| chat.clone(), Jid::new)
    } else {
        chat.clone()
    };

    let body = content.body().to_string();
    let text = content.text().to_string();
    let display_name = raw
        .push_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

    Some(InboundMessage {
        id: raw.key.id.clone(),
        chat,
        sender,
        is_group,
        from_me: raw.key.from_me,
        display_name,
        body,
        text,
        raw,
    })
}
