//! Handler capability and the context handed to every invocation.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use herald_core::{CommandRegistry, InboundMessage, Invocation, Jid, OutboundContent};

use crate::{
    client::SessionClient,
    error::{HandlerError, SessionError},
    store::GroupConfigStore,
};

/// Registry of boxed handlers, as installed in the router.
pub type HandlerRegistry = CommandRegistry<DynHandler>;

/// Shared handler trait object.
pub type DynHandler = Arc<dyn Handler>;

/// Code run for a matched command or a passive event.
///
/// Each invocation runs in its own task. Errors and panics are caught at the
/// dispatch boundary.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handle one message.
    async fn handle(
        &self,
        ctx: HandlerContext,
        message: Arc<InboundMessage>,
        invocation: Arc<Invocation>,
    ) -> Result<(), HandlerError>;
}

/// Everything a handler may touch.
#[derive(Clone)]
pub struct HandlerContext {
    /// Session the message arrived on
    pub client: Arc<dyn SessionClient>,
    /// Per-group automation settings
    pub groups: Arc<dyn GroupConfigStore>,
    /// Installed command registry
    pub registry: Arc<HandlerRegistry>,
    /// Prefix shown in usage hints
    pub prefix: String,
    /// Bot owner, if configured
    pub owner: Option<Jid>,
}

impl HandlerContext {
    /// Send a text reply to the chat the message came from.
    pub async fn reply(
        &self,
        message: &InboundMessage,
        text: impl Into<String> + Send,
    ) -> Result<(), SessionError> {
        self.client.send_message(&message.chat, OutboundContent::text(text)).await
    }

    /// Whether the sender may change bot settings: the owner or the bot's own
    /// account.
    pub fn is_privileged(&self, message: &InboundMessage) -> bool {
        message.from_me || self.owner.as_ref() == Some(&message.sender)
    }
}

/// Handler built from an async closure.
pub struct FnHandler<F>(F);

/// Wrap an async closure as a [`DynHandler`].
pub fn handler_fn<F, Fut>(f: F) -> DynHandler
where
    F: Fn(HandlerContext, Arc<InboundMessage>, Arc<Invocation>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(HandlerContext, Arc<InboundMessage>, Arc<Invocation>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: HandlerContext,
        message: Arc<InboundMessage>,
        invocation: Arc<Invocation>,
    ) -> Result<(), HandlerError> {
        (self.0)(ctx, message, invocation).await
    }
}
