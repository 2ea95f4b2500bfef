//! Connection supervision runtime.
//!
//! Drives the core [`Supervisor`] state machine with real sessions: opens a
//! session through the [`SessionFactory`], feeds lifecycle events to the
//! machine, executes the returned actions and routes inbound events. The
//! loop ends only when the machine decides to terminate.
//!
//! Per session it also runs the cache snapshot timer and, for unregistered
//! credentials, the pairing code request. Both are stopped when the session
//! closes. In-flight events of a closed session get `drain_timeout` to
//! finish before they are aborted.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use herald_core::{
    DisconnectReason, Environment, InboundEvent, LifecycleEvent, OutboundContent, SessionEvent,
    SessionState, Supervisor, SupervisorAction,
};
use tokio::{
    sync::{AcquireError, OwnedSemaphorePermit, Semaphore},
    task::{AbortHandle, JoinHandle, JoinSet},
};

use crate::{
    client::{Session, SessionClient, SessionFactory},
    config::{BotConfig, PAIRING_CODE_DELAY},
    error::RuntimeError,
    plugins::{BuiltinPlugins, ManifestDir, PluginSource, load_plugins},
    router::EventRouter,
    store::{ContactStore, GroupConfigStore},
};

/// Why and after how much work the supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    /// Terminal close reason
    pub reason: DisconnectReason,
    /// Connections attempted, including the last one
    pub connections: u64,
    /// Reconnects performed
    pub reconnects: u64,
}

/// Aborts a task when dropped.
pub(crate) struct AbortOnDrop(AbortHandle);

impl AbortOnDrop {
    pub(crate) fn new<T>(task: &JoinHandle<T>) -> Self {
        Self(task.abort_handle())
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Next thing the session pump acts on.
enum Pumped {
    Event(Option<SessionEvent>),
    Permit(Result<OwnedSemaphorePermit, AcquireError>),
}

/// Owns the single live session and keeps it alive.
pub struct ConnectionSupervisor<F, E> {
    factory: F,
    env: E,
    machine: Supervisor,
    config: Arc<BotConfig>,
    router: Arc<EventRouter>,
    plugins: Vec<Box<dyn PluginSource>>,
    permits: Arc<Semaphore>,
}

impl<F, E> ConnectionSupervisor<F, E>
where
    F: SessionFactory,
    E: Environment,
{
    /// Create a supervisor. Plugins default to the built-in set plus the
    /// configured manifest directory.
    pub fn new(
        factory: F,
        env: E,
        config: BotConfig,
        groups: Arc<dyn GroupConfigStore>,
        contacts: Arc<dyn ContactStore>,
    ) -> Self {
        let router = Arc::new(EventRouter::new(&config, groups, contacts));

        let mut plugins: Vec<Box<dyn PluginSource>> = vec![Box::new(BuiltinPlugins)];
        if let Some(dir) = &config.plugin_dir {
            plugins.push(Box::new(ManifestDir::new(dir)));
        }

        Self {
            factory,
            env,
            machine: Supervisor::new(config.reconnect),
            permits: Arc::new(Semaphore::new(config.max_concurrent_events.max(1))),
            config: Arc::new(config),
            router,
            plugins,
        }
    }

    /// Replace the plugin sources loaded on first connection.
    #[must_use]
    pub fn with_plugins(mut self, plugins: Vec<Box<dyn PluginSource>>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Router shared with every session.
    pub fn router(&self) -> Arc<EventRouter> {
        Arc::clone(&self.router)
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Supervise sessions until a terminal close.
    ///
    /// # Errors
    ///
    /// `RuntimeError` only if the state machine rejects a transition, which
    /// indicates a bug.
    pub async fn run(mut self) -> Result<Termination, RuntimeError> {
        tracing::info!("Starting {} {}", self.config.bot_name, self.config.version);

        loop {
            let actions = match self.factory.connect().await {
                Ok(session) => self.supervise(session).await?,
                Err(e) => {
                    tracing::warn!("Connection attempt failed: {}", e);
                    self.machine.handle(LifecycleEvent::Close {
                        reason: e.disconnect_reason(),
                        detail: Some(e.to_string()),
                    })?
                },
            };

            if let Some(termination) = self.after_close(actions).await? {
                return Ok(termination);
            }
        }
    }

    /// Pump one session until it closes. Returns the machine's actions for
    /// the close.
    ///
    /// Inbound events beyond `max_concurrent_events` wait in a backlog while
    /// the pump keeps reading, so a close is seen even when every permit is
    /// held by a stuck handler.
    async fn supervise(&mut self, session: Session) -> Result<Vec<SupervisorAction>, RuntimeError> {
        let Session { client, mut events } = session;
        let started = self.env.now();

        let mut background = Vec::new();
        background.extend(self.spawn_snapshots(&client));
        background.extend(self.spawn_pairing(&client));
        let mut inflight = JoinSet::new();
        let mut backlog = VecDeque::new();

        let actions = loop {
            while inflight.try_join_next().is_some() {}

            let pumped = if backlog.is_empty() {
                Pumped::Event(events.recv().await)
            } else {
                tokio::select! {
                    biased;
                    permit = Arc::clone(&self.permits).acquire_owned() => Pumped::Permit(permit),
                    event = events.recv() => Pumped::Event(event),
                }
            };

            let event = match pumped {
                Pumped::Permit(Ok(permit)) => {
                    if let Some(event) = backlog.pop_front() {
                        self.spawn_inbound(&client, event, permit, &mut inflight);
                    }
                    continue;
                },
                Pumped::Permit(Err(_)) => {
                    tracing::error!("Event permits closed, dropping {} events", backlog.len());
                    backlog.clear();
                    continue;
                },
                Pumped::Event(None) => {
                    tracing::warn!("Session event stream ended without a close event");
                    break self.machine.handle(LifecycleEvent::Close {
                        reason: DisconnectReason::Unknown,
                        detail: Some("event stream ended".to_string()),
                    })?;
                },
                Pumped::Event(Some(event)) => event,
            };

            match event {
                SessionEvent::Lifecycle(LifecycleEvent::Open) => {
                    let actions = self.machine.handle(LifecycleEvent::Open)?;
                    self.run_startup(&client, actions).await;
                },
                SessionEvent::Lifecycle(close @ LifecycleEvent::Close { .. }) => {
                    if let LifecycleEvent::Close { reason, detail: Some(detail) } = &close {
                        tracing::info!("Connection closed: {} ({})", reason, detail);
                    }
                    break self.machine.handle(close)?;
                },
                SessionEvent::Inbound(event) => {
                    if backlog.is_empty()
                        && let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned()
                    {
                        self.spawn_inbound(&client, event, permit, &mut inflight);
                    } else {
                        backlog.push_back(event);
                    }
                },
            }
        };

        self.drain(&client, &mut inflight, backlog).await;
        drop(background);
        tracing::debug!("Session ended after {:?}", self.env.now() - started);

        Ok(actions)
    }

    /// Finish the backlog and in-flight events of a closed session. Whatever
    /// is still running after `drain_timeout` is aborted.
    async fn drain(
        &self,
        client: &Arc<dyn SessionClient>,
        inflight: &mut JoinSet<()>,
        backlog: VecDeque<InboundEvent>,
    ) {
        let timeout = self.config.drain_timeout;
        let finish = async {
            for event in backlog {
                let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                    break;
                };
                self.spawn_inbound(client, event, permit, inflight);
            }
            while inflight.join_next().await.is_some() {}
        };

        let finished = tokio::time::timeout(timeout, finish).await;
        if finished.is_err() {
            tracing::warn!("Aborting {} in-flight events after {:?}", inflight.len(), timeout);
            inflight.abort_all();
            while inflight.join_next().await.is_some() {}
        }
    }

    async fn run_startup(&self, client: &Arc<dyn SessionClient>, actions: Vec<SupervisorAction>) {
        for action in actions {
            let SupervisorAction::RunStartup { connection_id, first } = action else {
                continue;
            };
            tracing::info!(
                "{} (connection {})",
                if first { "Connected" } else { "Reconnected" },
                connection_id
            );

            if self.router.registry().is_none() {
                let registry = load_plugins(&self.plugins);
                self.router.install_registry(registry);
            }

            if let Some(owner) = &self.config.owner {
                let notice = OutboundContent::text(self.config.startup_notice());
                if let Err(e) = client.send_message(owner, notice).await {
                    tracing::warn!("Failed to notify owner {}: {}", owner, e);
                }
            }
        }
    }

    fn spawn_inbound(
        &self,
        client: &Arc<dyn SessionClient>,
        event: InboundEvent,
        permit: OwnedSemaphorePermit,
        inflight: &mut JoinSet<()>,
    ) {
        let router = Arc::clone(&self.router);
        let client = Arc::clone(client);
        inflight.spawn(async move {
            let _permit = permit;
            router.on_inbound_event(&client, event).await;
        });
    }

    /// Handle the actions produced by a close. `Some` when supervision ends.
    async fn after_close(
        &mut self,
        actions: Vec<SupervisorAction>,
    ) -> Result<Option<Termination>, RuntimeError> {
        for action in actions {
            match action {
                SupervisorAction::Reconnect { attempt, delay, reason } => {
                    tracing::warn!(
                        "Connection lost ({}), reconnecting (attempt {})",
                        reason,
                        attempt
                    );
                    self.env.sleep(delay).await;
                    self.machine.reconnecting()?;
                    return Ok(None);
                },
                SupervisorAction::Terminate { reason } => {
                    tracing::error!(
                        "Connection closed ({}), not reconnecting: {}",
                        reason,
                        reason.remediation()
                    );
                    return Ok(Some(Termination {
                        reason,
                        connections: self.machine.connection_id(),
                        reconnects: self.machine.reconnect_count(),
                    }));
                },
                SupervisorAction::RunStartup { .. } => {},
            }
        }
        Err(RuntimeError::NoTransition)
    }

    fn spawn_snapshots(&self, client: &Arc<dyn SessionClient>) -> Option<AbortOnDrop> {
        let period = self.config.snapshot_interval;
        if period.is_zero() {
            return None;
        }

        let task = tokio::spawn(write_snapshots(self.env.clone(), Arc::clone(client), period));
        Some(AbortOnDrop::new(&task))
    }

    fn spawn_pairing(&self, client: &Arc<dyn SessionClient>) -> Option<AbortOnDrop> {
        let number = self.config.pairing_number.clone()?;
        if client.is_registered() {
            return None;
        }

        let client = Arc::clone(client);
        let env = self.env.clone();
        let task = tokio::spawn(async move {
            env.sleep(PAIRING_CODE_DELAY).await;
            match client.request_pairing_code(&number).await {
                Ok(code) => tracing::info!("Pairing code: {}", format_pairing_code(&code)),
                Err(e) => tracing::error!("Failed to request pairing code: {}", e),
            }
        });
        Some(AbortOnDrop::new(&task))
    }
}

/// Ask `client` to write its cache snapshot every `period` until the task is
/// dropped. The first snapshot is written after one full period.
pub async fn write_snapshots<E: Environment>(
    env: E,
    client: Arc<dyn SessionClient>,
    period: Duration,
) {
    loop {
        env.sleep(period).await;
        if let Err(e) = client.write_cache_snapshot().await {
            tracing::warn!("Failed to write cache snapshot: {}", e);
        }
    }
}

/// Group a pairing code in blocks of four for display (`ABCD-EFGH`).
pub fn format_pairing_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    chars.chunks(4).map(|chunk| chunk.iter().collect::<String>()).collect::<Vec<_>>().join("-")
}
