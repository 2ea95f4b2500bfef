//! Group membership automation.
//!
//! Reacts to membership events: rejects joiners whose calling code is denied,
//! greets and bids farewell when a group has automation enabled, and
//! announces role changes in any group with a settings record.
//!
//! Members of one event are processed sequentially in provider order. A
//! failure for one member is logged and the next member is still processed.
//!
//! # Per-member decision
//!
//! ```text
//! add    -> global denylist? ─ yes ─> notice + remove
//!              │ no
//!           record? ─ no ─> stop
//!              │ yes
//!           group denylist? ─ yes ─> notice + remove
//!              │ no
//!           enabled? ─ yes ─> welcome
//!
//! remove -> record and enabled? ─ yes ─> goodbye
//!
//! promote / demote -> record? ─ yes ─> role notice with picture
//! ```

use std::sync::Arc;

use herald_core::{
    AntiFraudPolicy, GroupConfig, GroupMetadata, Jid, MembershipAction, MembershipEvent, Notice,
    OutboundContent, Verdict, membership::{rejection_notice, role_notice},
};

use crate::{
    client::SessionClient,
    error::{AutomationError, SessionError},
    store::GroupConfigStore,
};

/// What happened to one member of a membership event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    /// Calling code denied; notice sent and removal requested
    Rejected {
        /// Denied calling code
        code: u16,
    },
    /// Welcome notice sent
    Welcomed,
    /// Goodbye notice sent
    FarewellSent,
    /// Promotion or demotion notice sent
    RoleNoticeSent,
    /// Group has no settings record
    Unconfigured,
    /// Group has a record with automation disabled
    Disabled,
    /// Processing failed; logged
    Failed(AutomationError),
}

/// Outcomes of one membership event, in member order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationReport {
    /// Group the event happened in
    pub group: Jid,
    /// Kind of change
    pub action: MembershipAction,
    /// Outcome per member
    pub outcomes: Vec<(Jid, MemberOutcome)>,
}

impl AutomationReport {
    /// Outcome for `member`, if it was part of the event.
    pub fn outcome(&self, member: &Jid) -> Option<&MemberOutcome> {
        self.outcomes.iter().find(|(m, _)| m == member).map(|(_, outcome)| outcome)
    }
}

/// Membership automation engine.
pub struct GroupAutomationEngine {
    policy: AntiFraudPolicy,
    groups: Arc<dyn GroupConfigStore>,
    default_avatar_url: String,
}

impl GroupAutomationEngine {
    /// Create an engine with a global denylist.
    pub fn new(
        policy: AntiFraudPolicy,
        groups: Arc<dyn GroupConfigStore>,
        default_avatar_url: impl Into<String>,
    ) -> Self {
        Self { policy, groups, default_avatar_url: default_avatar_url.into() }
    }

    /// Process a membership event.
    ///
    /// Never fails; per-member failures are logged and reported.
    pub async fn on_membership_event(
        &self,
        client: &dyn SessionClient,
        event: &MembershipEvent,
    ) -> AutomationReport {
        let mut metadata = None;
        let mut outcomes = Vec::with_capacity(event.members.len());

        for member in &event.members {
            let outcome = match self.process_member(client, event, member, &mut metadata).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(
                        "Membership automation failed for {} in {}: {}",
                        member,
                        event.group,
                        e
                    );
                    MemberOutcome::Failed(e)
                },
            };
            outcomes.push((member.clone(), outcome));
        }

        AutomationReport { group: event.group.clone(), action: event.action, outcomes }
    }

    async fn process_member(
        &self,
        client: &dyn SessionClient,
        event: &MembershipEvent,
        member: &Jid,
        metadata: &mut Option<GroupMetadata>,
    ) -> Result<MemberOutcome, AutomationError> {
        if event.action == MembershipAction::Add
            && let Verdict::Reject { code } = self.policy.check(member)
        {
            return self.reject(client, &event.group, member, code).await;
        }

        let Some(config) = self.groups.find_by_group_id(&event.group).await? else {
            return Ok(MemberOutcome::Unconfigured);
        };

        match event.action {
            MembershipAction::Add => {
                let group_policy =
                    AntiFraudPolicy::new(config.blocked_country_codes.iter().copied());
                if let Verdict::Reject { code } = group_policy.check(member) {
                    return self.reject(client, &event.group, member, code).await;
                }
                self.greet(client, event, member, &config, &config.welcome_template, metadata)
                    .await
                    .map(|sent| {
                        if sent { MemberOutcome::Welcomed } else { MemberOutcome::Disabled }
                    })
            },
            MembershipAction::Remove => self
                .greet(client, event, member, &config, &config.goodbye_template, metadata)
                .await
                .map(|sent| {
                    if sent { MemberOutcome::FarewellSent } else { MemberOutcome::Disabled }
                }),
            MembershipAction::Promote | MembershipAction::Demote => {
                let subject = self.metadata(client, &event.group, metadata).await?.subject.clone();
                let Some(caption) = role_notice(event.action, member, &subject) else {
                    return Ok(MemberOutcome::Disabled);
                };
                let url = self.picture(client, member).await;
                let content =
                    OutboundContent::Image { url, caption, mentions: vec![member.clone()] };
                client.send_message(&event.group, content).await?;
                Ok(MemberOutcome::RoleNoticeSent)
            },
        }
    }

    /// Send a welcome or goodbye notice. `false` if automation is disabled.
    async fn greet(
        &self,
        client: &dyn SessionClient,
        event: &MembershipEvent,
        member: &Jid,
        config: &GroupConfig,
        template: &str,
        metadata: &mut Option<GroupMetadata>,
    ) -> Result<bool, AutomationError> {
        if !config.automation_enabled {
            return Ok(false);
        }

        let metadata = self.metadata(client, &event.group, metadata).await?;
        let notice = Notice::render(template, member, metadata);
        let url = if notice.needs_picture() {
            self.picture(client, member).await
        } else {
            String::new()
        };

        client.send_message(&event.group, notice.into_content(member, &url)).await?;
        Ok(true)
    }

    async fn reject(
        &self,
        client: &dyn SessionClient,
        group: &Jid,
        member: &Jid,
        code: u16,
    ) -> Result<MemberOutcome, AutomationError> {
        tracing::info!("Rejecting {} from {}: calling code {} is denied", member, group, code);

        let notice = OutboundContent::text(rejection_notice(code));
        if let Err(e) = client.send_message(group, notice).await {
            tracing::warn!("Failed to send rejection notice to {}: {}", group, e);
        }
        client.remove_participants(group, std::slice::from_ref(member)).await?;

        Ok(MemberOutcome::Rejected { code })
    }

    /// Group metadata, fetched once per event. Failed fetches are retried for
    /// the next member.
    async fn metadata<'a>(
        &self,
        client: &dyn SessionClient,
        group: &Jid,
        cache: &'a mut Option<GroupMetadata>,
    ) -> Result<&'a GroupMetadata, SessionError> {
        let metadata = match cache.take() {
            Some(metadata) => metadata,
            None => client.group_metadata(group).await?,
        };
        Ok(cache.insert(metadata))
    }

    async fn picture(&self, client: &dyn SessionClient, member: &Jid) -> String {
        match client.profile_picture_url(member).await {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("No profile picture for {}, using default: {}", member, e);
                self.default_avatar_url.clone()
            },
        }
    }
}
