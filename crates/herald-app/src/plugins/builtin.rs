//! Commands that ship with the bot.

use std::{fmt::Write as _, sync::Arc};

use async_trait::async_trait;
use herald_core::{
    CommandDescriptor, EventKind, GroupConfigUpdate, InboundMessage, Invocation,
    antifraud::parse_codes,
};

use super::{Plugin, PluginRegistrar, PluginSource};
use crate::{
    error::{HandlerError, PluginError},
    handler::{Handler, HandlerContext},
};

/// Source yielding the built-in plugins.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPlugins;

impl PluginSource for BuiltinPlugins {
    fn name(&self) -> &str {
        "builtin"
    }

    fn plugins(&self) -> Vec<Result<Box<dyn Plugin>, PluginError>> {
        vec![Ok(Box::new(CorePlugin)), Ok(Box::new(GroupSettingsPlugin))]
    }
}

/// `ping` and `help`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorePlugin;

impl Plugin for CorePlugin {
    fn name(&self) -> &str {
        "core"
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> Result<(), PluginError> {
        registrar
            .add(
                CommandDescriptor::command("ping").describe("Check the bot is alive"),
                Arc::new(Ping),
            )
            .add(
                CommandDescriptor::command("help").alias("menu").describe("List commands"),
                Arc::new(Help),
            );
        Ok(())
    }
}

/// Group automation settings: templates, the events switch and the per-group
/// calling code denylist.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupSettingsPlugin;

impl Plugin for GroupSettingsPlugin {
    fn name(&self) -> &str {
        "group-settings"
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> Result<(), PluginError> {
        registrar
            .add(
                CommandDescriptor::command("setwelcome").describe("Set the welcome message"),
                Arc::new(SetTemplate(Template::Welcome)),
            )
            .add(
                CommandDescriptor::command("setgoodbye").describe("Set the goodbye message"),
                Arc::new(SetTemplate(Template::Goodbye)),
            )
            .add(
                CommandDescriptor::command("events")
                    .alias("welcome")
                    .describe("Turn welcome and goodbye messages on or off"),
                Arc::new(Events),
            )
            .add(
                CommandDescriptor::command("blockcodes")
                    .describe("Reject joiners from these calling codes"),
                Arc::new(BlockCodes),
            );
        Ok(())
    }
}

struct Ping;

#[async_trait]
impl Handler for Ping {
    async fn handle(
        &self,
        ctx: HandlerContext,
        message: Arc<InboundMessage>,
        _invocation: Arc<Invocation>,
    ) -> Result<(), HandlerError> {
        ctx.reply(&message, "pong").await?;
        Ok(())
    }
}

struct Help;

#[async_trait]
impl Handler for Help {
    async fn handle(
        &self,
        ctx: HandlerContext,
        message: Arc<InboundMessage>,
        _invocation: Arc<Invocation>,
    ) -> Result<(), HandlerError> {
        let text = help_text(&ctx);
        ctx.reply(&message, text).await?;
        Ok(())
    }
}

fn help_text(ctx: &HandlerContext) -> String {
    let mut text = String::from("*Commands*\n");
    for entry in ctx.registry.of_kind(EventKind::Command) {
        let descriptor = &entry.descriptor;
        let _ = write!(text, "\n{}{}", ctx.prefix, descriptor.pattern);
        if !descriptor.aliases.is_empty() {
            let aliases: Vec<&str> = descriptor.aliases.iter().map(String::as_str).collect();
            let _ = write!(text, " ({})", aliases.join(", "));
        }
        if !descriptor.description.is_empty() {
            let _ = write!(text, " - {}", descriptor.description);
        }
    }
    text
}

/// Settings commands only run in groups, for the owner or the bot itself.
async fn settings_allowed(
    ctx: &HandlerContext,
    message: &InboundMessage,
) -> Result<bool, HandlerError> {
    if !message.is_group {
        ctx.reply(message, "This command only works in groups.").await?;
        return Ok(false);
    }
    if !ctx.is_privileged(message) {
        ctx.reply(message, "Only the bot owner can change group settings.").await?;
        return Ok(false);
    }
    Ok(true)
}

#[derive(Debug, Clone, Copy)]
enum Template {
    Welcome,
    Goodbye,
}

struct SetTemplate(Template);

#[async_trait]
impl Handler for SetTemplate {
    async fn handle(
        &self,
        ctx: HandlerContext,
        message: Arc<InboundMessage>,
        invocation: Arc<Invocation>,
    ) -> Result<(), HandlerError> {
        if !settings_allowed(&ctx, &message).await? {
            return Ok(());
        }

        if invocation.text.is_empty() {
            let usage = format!(
                "Usage: {}{} <text>\nPlaceholders: @user @gname @desc @count @pp",
                ctx.prefix, invocation.name
            );
            ctx.reply(&message, usage).await?;
            return Ok(());
        }

        let template = Some(invocation.text.clone());
        let (update, confirmation) = match self.0 {
            Template::Welcome => (
                GroupConfigUpdate { welcome_template: template, ..Default::default() },
                "Welcome message updated.",
            ),
            Template::Goodbye => (
                GroupConfigUpdate { goodbye_template: template, ..Default::default() },
                "Goodbye message updated.",
            ),
        };
        ctx.groups.upsert(&message.chat, update).await?;
        ctx.reply(&message, confirmation).await?;
        Ok(())
    }
}

struct Events;

#[async_trait]
impl Handler for Events {
    async fn handle(
        &self,
        ctx: HandlerContext,
        message: Arc<InboundMessage>,
        invocation: Arc<Invocation>,
    ) -> Result<(), HandlerError> {
        if !settings_allowed(&ctx, &message).await? {
            return Ok(());
        }

        let enabled = match invocation.args.first().map(|a| a.to_lowercase()).as_deref() {
            Some("on") => true,
            Some("off") => false,
            _ => {
                let usage = format!("Usage: {}{} on|off", ctx.prefix, invocation.name);
                ctx.reply(&message, usage).await?;
                return Ok(());
            },
        };

        let update = GroupConfigUpdate { automation_enabled: Some(enabled), ..Default::default() };
        ctx.groups.upsert(&message.chat, update).await?;

        let state = if enabled { "enabled" } else { "disabled" };
        ctx.reply(&message, format!("Group events {state}.")).await?;
        Ok(())
    }
}

struct BlockCodes;

#[async_trait]
impl Handler for BlockCodes {
    async fn handle(
        &self,
        ctx: HandlerContext,
        message: Arc<InboundMessage>,
        invocation: Arc<Invocation>,
    ) -> Result<(), HandlerError> {
        if !settings_allowed(&ctx, &message).await? {
            return Ok(());
        }

        let codes = match invocation.text.to_lowercase().as_str() {
            "" => {
                let current = ctx
                    .groups
                    .find_by_group_id(&message.chat)
                    .await?
                    .map(|config| config.blocked_country_codes)
                    .unwrap_or_default();
                let usage = format!(
                    "Blocked calling codes: {}\nUsage: {}{} <codes>|off",
                    format_codes(&current),
                    ctx.prefix,
                    invocation.name
                );
                ctx.reply(&message, usage).await?;
                return Ok(());
            },
            "off" | "none" => Vec::new(),
            text => {
                let codes = parse_codes(text);
                if codes.is_empty() {
                    ctx.reply(&message, "No valid calling codes given.").await?;
                    return Ok(());
                }
                codes
            },
        };

        let update =
            GroupConfigUpdate { blocked_country_codes: Some(codes), ..Default::default() };
        let config = ctx.groups.upsert(&message.chat, update).await?;

        let codes = format_codes(&config.blocked_country_codes);
        let reply = format!("Blocked calling codes: {}", codes);
        ctx.reply(&message, reply).await?;
        Ok(())
    }
}

fn format_codes(codes: &[u16]) -> String {
    if codes.is_empty() {
        return "none".to_string();
    }
    codes.iter().map(u16::to_string).collect::<Vec<_>>().join(", ")
}
