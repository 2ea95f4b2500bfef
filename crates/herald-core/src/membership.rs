//! Group membership events, per-group configuration and notice rendering.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

use crate::{content::OutboundContent, jid::Jid};

/// Placeholder that turns a welcome or goodbye notice into an image of the
/// member's profile picture.
pub const PICTURE_PLACEHOLDER: &str = "@pp";

static USER_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| placeholder("@user"));
static GROUP_NAME_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| placeholder("@gname"));
static DESCRIPTION_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| placeholder("@desc"));
static COUNT_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| placeholder("@count"));

#[allow(clippy::expect_used)]
fn placeholder(token: &str) -> Regex {
    Regex::new(&format!("(?i){}", regex::escape(token)))
        .expect("invariant: escaped literal is a valid pattern")
}

/// Kind of membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipAction {
    /// Members joined or were added
    Add,
    /// Members left or were removed
    Remove,
    /// Members became admins
    Promote,
    /// Members lost admin rights
    Demote,
}

impl MembershipAction {
    /// Parse the provider action name.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            "promote" => Some(Self::Promote),
            "demote" => Some(Self::Demote),
            _ => None,
        }
    }
}

/// Membership update as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParticipantsUpdate {
    /// Group identifier
    pub id: String,
    /// Affected member identifiers
    pub participants: Vec<String>,
    /// Provider action name
    pub action: String,
}

/// Normalized membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipEvent {
    /// Group the change happened in
    pub group: Jid,
    /// Kind of change
    pub action: MembershipAction,
    /// Affected members, in provider order
    pub members: Vec<Jid>,
}

impl MembershipEvent {
    /// Normalize a provider update. `None` for unknown actions.
    pub fn from_raw(raw: &RawParticipantsUpdate) -> Option<Self> {
        let action = MembershipAction::parse(&raw.action)?;
        Some(Self {
            group: Jid::new(&raw.id),
            action,
            members: raw.participants.iter().map(Jid::new).collect(),
        })
    }
}

/// Group metadata fetched from the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMetadata {
    /// Group identifier
    pub id: Jid,
    /// Group name
    pub subject: String,
    /// Group description
    pub description: Option<String>,
    /// Current members
    pub participants: Vec<Jid>,
}

/// Per-group automation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Group identifier
    pub group_id: Jid,
    /// Welcome and goodbye notices enabled
    pub automation_enabled: bool,
    /// Template rendered when members join
    pub welcome_template: String,
    /// Template rendered when members leave
    pub goodbye_template: String,
    /// Calling codes rejected in this group, on top of the global denylist
    #[serde(default)]
    pub blocked_country_codes: Vec<u16>,
}

impl GroupConfig {
    /// Default settings for a group: automation disabled, stock templates.
    pub fn new(group_id: Jid) -> Self {
        Self {
            group_id,
            automation_enabled: false,
            welcome_template: "Welcome @user to @gname".to_string(),
            goodbye_template: "Goodbye @user".to_string(),
            blocked_country_codes: Vec::new(),
        }
    }

    /// Apply a partial update.
    pub fn apply(&mut self, update: GroupConfigUpdate) {
        if let Some(enabled) = update.automation_enabled {
            self.automation_enabled = enabled;
        }
        if let Some(welcome) = update.welcome_template {
            self.welcome_template = welcome;
        }
        if let Some(goodbye) = update.goodbye_template {
            self.goodbye_template = goodbye;
        }
        if let Some(codes) = update.blocked_country_codes {
            self.blocked_country_codes = codes;
        }
    }
}

/// Partial update of a [`GroupConfig`]. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupConfigUpdate {
    /// New automation flag
    pub automation_enabled: Option<bool>,
    /// New welcome template
    pub welcome_template: Option<String>,
    /// New goodbye template
    pub goodbye_template: Option<String>,
    /// New per-group denylist
    pub blocked_country_codes: Option<Vec<u16>>,
}

/// Substitute member, group name, description and member count placeholders.
///
/// Placeholders match case-insensitively. The member placeholder becomes a
/// mention token; everything else is substituted literally.
pub fn render_template(template: &str, member: &Jid, metadata: &GroupMetadata) -> String {
    let count = metadata.participants.len().to_string();
    let description = metadata.description.as_deref().unwrap_or("");

    let text = USER_PLACEHOLDER.replace_all(template, NoExpand(&member.mention()));
    let text = GROUP_NAME_PLACEHOLDER.replace_all(&text, NoExpand(&metadata.subject));
    let text = DESCRIPTION_PLACEHOLDER.replace_all(&text, NoExpand(description));
    COUNT_PLACEHOLDER.replace_all(&text, NoExpand(&count)).into_owned()
}

/// Rendered welcome or goodbye notice, before the picture is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Plain text notice
    Text(String),
    /// Image notice with the member's profile picture
    Picture {
        /// Caption with the picture placeholder removed
        caption: String,
    },
}

impl Notice {
    /// Render a template for one member.
    pub fn render(template: &str, member: &Jid, metadata: &GroupMetadata) -> Self {
        let text = render_template(template, member, metadata);
        if text.contains(PICTURE_PLACEHOLDER) {
            Self::Picture { caption: text.replace(PICTURE_PLACEHOLDER, "") }
        } else {
            Self::Text(text)
        }
    }

    /// Whether the notice needs the member's profile picture.
    pub fn needs_picture(&self) -> bool {
        matches!(self, Self::Picture { .. })
    }

    /// Outbound content mentioning `member`. `picture_url` is used for
    /// picture notices only.
    pub fn into_content(self, member: &Jid, picture_url: &str) -> OutboundContent {
        let mentions = vec![member.clone()];
        match self {
            Self::Text(text) => OutboundContent::Text { text, mentions },
            Self::Picture { caption } => {
                OutboundContent::Image { url: picture_url.to_string(), caption, mentions }
            },
        }
    }
}

/// Role change notice caption for promotions and demotions.
///
/// Returns `None` for actions that are not role changes.
pub fn role_notice(action: MembershipAction, member: &Jid, group_name: &str) -> Option<String> {
    let (title, transition) = match action {
        MembershipAction::Promote => ("PROMOTE", "Member -> Admin"),
        MembershipAction::Demote => ("DEMOTE", "Admin -> Member"),
        MembershipAction::Add | MembershipAction::Remove => return None,
    };

    Some(format!(
        "[ {title} - DETECTED ]\n\nName : {}\nStatus : {transition}\nGroup : {group_name}",
        member.mention()
    ))
}

/// Rejection notice sent before removing a member with a denied calling code.
pub fn rejection_notice(code: u16) -> String {
    format!("{code} number is not allowed")
}
