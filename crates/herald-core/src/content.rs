//! Outbound message content.

use crate::jid::Jid;

/// Content of an outbound message.
///
/// Every identity mentioned in the text must be listed in `mentions`,
/// otherwise the provider renders the `@number` token as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    /// Text message
    Text {
        /// Message text
        text: String,
        /// Mentioned identities
        mentions: Vec<Jid>,
    },
    /// Image fetched by the provider from `url`
    Image {
        /// Image location
        url: String,
        /// Caption text
        caption: String,
        /// Mentioned identities
        mentions: Vec<Jid>,
    },
}

impl OutboundContent {
    /// Text message without mentions.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into(), mentions: Vec::new() }
    }

    /// Text or caption of the message.
    pub fn body(&self) -> &str {
        match self {
            Self::Text { text, .. } => text,
            Self::Image { caption, .. } => caption,
        }
    }

    /// Identities mentioned by the message.
    pub fn mentions(&self) -> &[Jid] {
        match self {
            Self::Text { mentions, .. } | Self::Image { mentions, .. } => mentions,
        }
    }
}
