//! Inbound event routing.
//!
//! Each provider event is one unit of work:
//!
//! ```text
//! messages     -> normalize -> command handler (awaited) -> passive handlers (joined)
//! participants -> group automation
//! contacts     -> contact store
//! credentials  -> persist
//! ```
//!
//! Handler failures and panics are caught here and never reach the
//! supervisor. Events for different messages may be routed concurrently.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{Arc, OnceLock},
};

use futures::FutureExt;
use herald_core::{
    Contact, EventKind, InboundEvent, InboundMessage, Invocation, Jid, MembershipEvent, RawMessage,
    message::normalize,
};
use tokio::task::JoinSet;

use crate::{
    automation::{AutomationReport, GroupAutomationEngine},
    client::SessionClient,
    config::BotConfig,
    error::HandlerError,
    handler::{DynHandler, HandlerContext, HandlerRegistry},
    store::{ContactRecord, ContactStore, GroupConfigStore},
    supervisor::AbortOnDrop,
};

/// Result of the command stage for one message.
#[derive(Debug)]
pub enum CommandOutcome {
    /// No command or alias with this name
    Unknown {
        /// Parsed command name
        name: String,
    },
    /// Handler ran to completion
    Completed {
        /// Pattern of the handler that ran
        pattern: String,
    },
    /// Handler failed or panicked; a failure notice was sent
    Failed {
        /// Pattern of the handler that ran
        pattern: String,
        /// Handler error
        error: HandlerError,
    },
}

/// Result of one passive handler.
#[derive(Debug)]
pub struct PassiveOutcome {
    /// Pattern of the handler
    pub pattern: String,
    /// Event kind it was registered for
    pub kind: EventKind,
    /// Handler result
    pub result: Result<(), HandlerError>,
}

/// What the router did with one message.
#[derive(Debug)]
pub struct DispatchReport {
    /// Provider message ID
    pub message_id: String,
    /// Command stage, `None` if the body had no prefix
    pub command: Option<CommandOutcome>,
    /// Passive handlers that fired, in completion order
    pub passive: Vec<PassiveOutcome>,
}

impl DispatchReport {
    /// Pattern of the command handler that ran, if any.
    pub fn command_pattern(&self) -> Option<&str> {
        match &self.command {
            Some(
                CommandOutcome::Completed { pattern } | CommandOutcome::Failed { pattern, .. },
            ) => {
                Some(pattern)
            },
            Some(CommandOutcome::Unknown { .. }) | None => None,
        }
    }

    /// Whether the passive handler `pattern` fired.
    pub fn passive_fired(&self, pattern: &str) -> bool {
        self.passive.iter().any(|p| p.pattern == pattern)
    }
}

/// What the router did with one inbound event.
#[derive(Debug)]
pub enum EventReport {
    /// Messages routed; normalized-away messages are absent
    Messages(Vec<DispatchReport>),
    /// Membership event processed; `None` for unknown actions
    Membership(Option<AutomationReport>),
    /// Contacts stored
    Contacts {
        /// Contacts written
        stored: usize,
        /// Contacts whose write failed
        failed: usize,
    },
    /// Credentials persisted (or the attempt failed and was logged)
    Credentials {
        /// Whether persisting succeeded
        persisted: bool,
    },
}

/// Routes inbound events to handlers, the automation engine and the stores.
pub struct EventRouter {
    prefixes: Vec<String>,
    owner: Option<Jid>,
    registry: OnceLock<Arc<HandlerRegistry>>,
    groups: Arc<dyn GroupConfigStore>,
    contacts: Arc<dyn ContactStore>,
    automation: GroupAutomationEngine,
}

impl EventRouter {
    /// Create a router. Messages are dropped until a registry is installed.
    pub fn new(
        config: &BotConfig,
        groups: Arc<dyn GroupConfigStore>,
        contacts: Arc<dyn ContactStore>,
    ) -> Self {
        let automation = GroupAutomationEngine::new(
            config.antifraud_policy(),
            Arc::clone(&groups),
            config.default_avatar_url.clone(),
        );
        Self {
            prefixes: config.prefixes.clone(),
            owner: config.owner.clone(),
            registry: OnceLock::new(),
            groups,
            contacts,
            automation,
        }
    }

    /// Install the command registry. Read-only afterwards.
    ///
    /// Returns `false` if a registry was already installed; the new one is
    /// discarded.
    pub fn install_registry(&self, registry: HandlerRegistry) -> bool {
        self.registry.set(Arc::new(registry)).is_ok()
    }

    /// Installed registry, if any.
    pub fn registry(&self) -> Option<&Arc<HandlerRegistry>> {
        self.registry.get()
    }

    /// Route one inbound event. Never fails; every error is logged.
    pub async fn on_inbound_event(
        &self,
        client: &Arc<dyn SessionClient>,
        event: InboundEvent,
    ) -> EventReport {
        match event {
            InboundEvent::MessagesUpsert(messages) => {
                let mut reports = Vec::with_capacity(messages.len());
                for raw in messages {
                    if let Some(report) = self.dispatch_message(client, raw).await {
                        reports.push(report);
                    }
                }
                EventReport::Messages(reports)
            },
            InboundEvent::ParticipantsUpdate(raw) => {
                let Some(event) = MembershipEvent::from_raw(&raw) else {
                    tracing::debug!("Ignoring membership action {:?} in {}", raw.action, raw.id);
                    return EventReport::Membership(None);
                };
                let report = self.automation.on_membership_event(client.as_ref(), &event).await;
                EventReport::Membership(Some(report))
            },
            InboundEvent::ContactsSync(contacts) => self.sync_contacts(contacts).await,
            InboundEvent::CredentialsUpdate => {
                let persisted = match client.persist_credentials().await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("Failed to persist credentials: {}", e);
                        false
                    },
                };
                EventReport::Credentials { persisted }
            },
        }
    }

    /// Route one message: normalize, run the matching command, then run
    /// every passive handler.
    ///
    /// `None` if the message was dropped (no content, status broadcast, or
    /// no registry installed yet).
    pub async fn dispatch_message(
        &self,
        client: &Arc<dyn SessionClient>,
        raw: RawMessage,
    ) -> Option<DispatchReport> {
        let own_id = client.own_id();
        let mut message = normalize(raw, own_id.as_ref())?;
        if message.raw.push_name.as_deref().is_none_or(|name| name.trim().is_empty())
            && let Some(name) = self.contact_name(&message.sender).await
        {
            message.display_name = name;
        }

        tracing::info!(
            "[{}] From: {} ({}) | Message: {}",
            if message.is_group { "GROUP" } else { "PRIVATE" },
            message.display_name,
            message.sender,
            message.body
        );

        let Some(registry) = self.registry.get() else {
            tracing::debug!("No command registry yet, dropping message {}", message.id);
            return None;
        };

        let invocation = Arc::new(Invocation::parse(&message.body, &self.prefixes));
        let message = Arc::new(message);
        let ctx = HandlerContext {
            client: Arc::clone(client),
            groups: Arc::clone(&self.groups),
            registry: Arc::clone(registry),
            prefix: self.prefixes.first().cloned().unwrap_or_default(),
            owner: self.owner.clone(),
        };

        let command = if invocation.is_cmd {
            Some(run_command(&ctx, registry, &message, &invocation).await)
        } else {
            None
        };
        let passive = run_passive(&ctx, registry, &message, &invocation).await;

        Some(DispatchReport { message_id: message.id.clone(), command, passive })
    }

    /// Name stored by contact sync, used when a message carries no push name.
    async fn contact_name(&self, id: &Jid) -> Option<String> {
        match self.contacts.find_contact(id).await {
            Ok(record) => record.and_then(|record| record.name),
            Err(e) => {
                tracing::debug!("Contact lookup failed for {}: {}", id, e);
                None
            },
        }
    }

    async fn sync_contacts(&self, contacts: Vec<Contact>) -> EventReport {
        let mut stored = 0;
        let mut failed = 0;
        for contact in contacts {
            let record = ContactRecord { id: Jid::new(&contact.id), name: contact.notify };
            match self.contacts.upsert_contact(record).await {
                Ok(()) => stored += 1,
                Err(e) => {
                    tracing::debug!("Contact sync failed for {}: {}", contact.id, e);
                    failed += 1;
                },
            }
        }
        EventReport::Contacts { stored, failed }
    }
}

async fn run_command(
    ctx: &HandlerContext,
    registry: &HandlerRegistry,
    message: &Arc<InboundMessage>,
    invocation: &Arc<Invocation>,
) -> CommandOutcome {
    let Some(entry) = registry.resolve_command(&invocation.name) else {
        tracing::debug!("Unknown command: {}", invocation.name);
        return CommandOutcome::Unknown { name: invocation.name.clone() };
    };
    let pattern = entry.descriptor.pattern.clone();

    let task = tokio::spawn(run_guarded(
        Arc::clone(&entry.handler),
        ctx.clone(),
        Arc::clone(message),
        Arc::clone(invocation),
    ));
    // Aborting this event must not leave the handler running
    let _abort = AbortOnDrop::new(&task);
    let result = task.await.unwrap_or(Err(HandlerError::Cancelled));

    match result {
        Ok(()) => CommandOutcome::Completed { pattern },
        Err(error) => {
            tracing::error!("Command {} failed: {}", pattern, error);
            let notice = format!("Error executing command: {}", invocation.name);
            if let Err(e) = ctx.reply(message, notice).await {
                tracing::warn!("Failed to send failure notice to {}: {}", message.chat, e);
            }
            CommandOutcome::Failed { pattern, error }
        },
    }
}

async fn run_passive(
    ctx: &HandlerContext,
    registry: &HandlerRegistry,
    message: &Arc<InboundMessage>,
    invocation: &Arc<Invocation>,
) -> Vec<PassiveOutcome> {
    let mut tasks = JoinSet::new();

    for entry in registry.iter() {
        let kind = entry.descriptor.kind;
        let fires = match kind {
            EventKind::OnBody => !message.body.is_empty(),
            EventKind::OnText => !message.text.is_empty(),
            EventKind::Command => false,
        };
        if !fires {
            continue;
        }

        let pattern = entry.descriptor.pattern.clone();
        let run = run_guarded(
            Arc::clone(&entry.handler),
            ctx.clone(),
            Arc::clone(message),
            Arc::clone(invocation),
        );
        tasks.spawn(async move { PassiveOutcome { pattern, kind, result: run.await } });
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => {
                if let Err(e) = &outcome.result {
                    tracing::warn!("Handler {} failed: {}", outcome.pattern, e);
                }
                outcomes.push(outcome);
            },
            Err(e) => tracing::warn!("Handler task did not complete: {}", e),
        }
    }
    outcomes
}

/// Run a handler, converting a panic into [`HandlerError::Panicked`].
async fn run_guarded(
    handler: DynHandler,
    ctx: HandlerContext,
    message: Arc<InboundMessage>,
    invocation: Arc<Invocation>,
) -> Result<(), HandlerError> {
    match AssertUnwindSafe(handler.handle(ctx, message, invocation)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
