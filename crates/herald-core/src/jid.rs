//! Network identifiers.
//!
//! Every addressable entity (user, group, broadcast channel) is identified by
//! a `user@server` string. Multi-device sessions append a device suffix to the
//! user part (`123:4@server`); [`Jid::new`] strips it so identifiers compare
//! equal regardless of which device produced them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server part of individual user identifiers.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Server part of group identifiers.
pub const GROUP_SERVER: &str = "g.us";

/// Status broadcast channel. Messages addressed here never reach handlers.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Normalized network identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    /// Parse and normalize an identifier, dropping any device suffix.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        match raw.split_once('@') {
            Some((user, server)) => {
                let user = user.split_once(':').map_or(user, |(u, _device)| u);
                Self(format!("{user}@{server}"))
            },
            None => Self(raw.to_string()),
        }
    }

    /// Identifier for an individual user from a bare phone number.
    ///
    /// Non-digit characters (`+`, spaces, dashes) are removed.
    pub fn user(number: &str) -> Self {
        let digits: String = number.chars().filter(char::is_ascii_digit).collect();
        Self(format!("{digits}@{USER_SERVER}"))
    }

    /// Parse a configured destination that may be either a full identifier or
    /// a bare phone number.
    pub fn parse_destination(value: &str) -> Self {
        if value.contains('@') { Self::new(value) } else { Self::user(value) }
    }

    /// Full identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// User part (before `@`). The whole identifier if there is no server.
    pub fn user_part(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(user, _)| user)
    }

    /// Server part (after `@`). Empty if there is no server.
    pub fn server(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, server)| server)
    }

    /// Whether this identifies a group chat.
    pub fn is_group(&self) -> bool {
        self.server() == GROUP_SERVER
    }

    /// Whether this is the status broadcast channel.
    pub fn is_status_broadcast(&self) -> bool {
        self.0 == STATUS_BROADCAST
    }

    /// Mention token the provider renders as a link to this identity.
    pub fn mention(&self) -> String {
        format!("@{}", self.user_part())
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Jid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Jid {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
