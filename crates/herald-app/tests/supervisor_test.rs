//! End-to-end supervision with scripted sessions and a virtual clock.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use herald_app::{
    BotConfig, ConnectionSupervisor, HandlerError, MemoryStore, SessionError, handler_fn,
    error::PluginError,
    plugins::{BuiltinPlugins, Plugin, PluginRegistrar, PluginSource},
    supervisor::write_snapshots,
};
use herald_core::{CommandDescriptor, DisconnectReason, Jid, ReconnectPolicy};
use herald_harness::{
    SimClient, SimEnv, SimFactory,
    fixtures::{close, inbound, open, private_text, upsert, user},
};
use proptest::prelude::*;

fn owner() -> Jid {
    Jid::user("999")
}

fn config() -> BotConfig {
    BotConfig {
        owner: Some(owner()),
        bot_name: "Herald".to_string(),
        version: "1.0.0".to_string(),
        snapshot_interval: Duration::ZERO,
        ..Default::default()
    }
}

fn supervisor(
    factory: SimFactory,
    env: SimEnv,
    config: BotConfig,
) -> ConnectionSupervisor<SimFactory, SimEnv> {
    let store = MemoryStore::new();
    ConnectionSupervisor::new(factory, env, config, Arc::new(store.clone()), Arc::new(store))
}

fn owner_notices(client: &SimClient) -> usize {
    client.sent_to(&owner()).len()
}

#[tokio::test]
async fn duplicate_open_sends_one_owner_notice() {
    let client = SimClient::new();
    let factory = SimFactory::new(client.clone())
        .session(vec![open(), open(), close(DisconnectReason::LoggedOut)]);

    let termination = supervisor(factory, SimEnv::new(), config()).run().await.unwrap();

    assert_eq!(termination.reason, DisconnectReason::LoggedOut);
    assert_eq!(owner_notices(&client), 1);
    assert_eq!(
        client.sent_to(&owner())[0].body(),
        "_Herald has started successfully!_\n_Version: 1.0.0_"
    );
}

#[tokio::test]
async fn transient_closes_reconnect_without_terminating() {
    let client = SimClient::new();
    let env = SimEnv::new();
    let factory = SimFactory::new(client.clone())
        .session(vec![open(), close(DisconnectReason::TransientNetwork)])
        .session(vec![open(), close(DisconnectReason::TransientNetwork)])
        .session(vec![open(), close(DisconnectReason::TransientNetwork)])
        .session(vec![open(), close(DisconnectReason::LoggedOut)]);

    let termination = supervisor(factory.clone(), env.clone(), config()).run().await.unwrap();

    assert_eq!(factory.connects(), 4);
    assert_eq!(termination.reconnects, 3);
    assert_eq!(termination.reason, DisconnectReason::LoggedOut);
    assert_eq!(env.sleeps().len(), 3);
    assert_eq!(owner_notices(&client), 4);
}

#[tokio::test]
async fn logged_out_terminates_without_reconnect() {
    let client = SimClient::new();
    let env = SimEnv::new();
    let factory = SimFactory::new(client.clone())
        .session(vec![open(), close(DisconnectReason::LoggedOut)])
        .session(vec![open()]);

    let termination = supervisor(factory.clone(), env.clone(), config()).run().await.unwrap();

    assert_eq!(termination.reason, DisconnectReason::LoggedOut);
    assert_eq!(termination.reconnects, 0);
    assert_eq!(factory.connects(), 1);
    assert!(env.sleeps().is_empty());
}

#[tokio::test]
async fn bad_session_and_replaced_terminate() {
    for reason in [DisconnectReason::BadSession, DisconnectReason::Replaced] {
        let factory = SimFactory::new(SimClient::new()).session(vec![open(), close(reason)]);

        let termination = supervisor(factory.clone(), SimEnv::new(), config()).run().await.unwrap();

        assert_eq!(termination.reason, reason);
        assert_eq!(factory.connects(), 1);
    }
}

#[tokio::test]
async fn failed_connect_is_retried() {
    let client = SimClient::new();
    let factory = SimFactory::new(client.clone())
        .fail(SessionError::Connect("refused".to_string()))
        .session(vec![open(), close(DisconnectReason::LoggedOut)]);

    let termination = supervisor(factory.clone(), SimEnv::new(), config()).run().await.unwrap();

    assert_eq!(factory.connects(), 2);
    assert_eq!(termination.reconnects, 1);
    assert_eq!(owner_notices(&client), 1);
}

#[tokio::test]
async fn stream_end_without_close_reconnects() {
    let factory = SimFactory::new(SimClient::new())
        .session(vec![open()])
        .session(vec![open(), close(DisconnectReason::LoggedOut)]);

    let termination = supervisor(factory.clone(), SimEnv::new(), config()).run().await.unwrap();

    assert_eq!(factory.connects(), 2);
    assert_eq!(termination.reconnects, 1);
}

#[tokio::test]
async fn backoff_delays_double_between_failures() {
    let env = SimEnv::new();
    let factory = SimFactory::new(SimClient::new())
        .session(vec![close(DisconnectReason::TransientNetwork)])
        .session(vec![close(DisconnectReason::TransientNetwork)])
        .session(vec![close(DisconnectReason::TransientNetwork)])
        .session(vec![close(DisconnectReason::LoggedOut)]);
    let config = BotConfig {
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
        },
        ..config()
    };

    supervisor(factory, env.clone(), config).run().await.unwrap();

    assert_eq!(env.sleeps(), vec![
        Duration::from_secs(1),
        Duration::from_secs(2),
        Duration::from_secs(3)
    ]);
}

#[tokio::test]
async fn commands_are_served_within_a_session() {
    let client = SimClient::new();
    let chat = user("1");
    let factory = SimFactory::new(client.clone()).session(vec![
        open(),
        inbound(upsert(vec![private_text(&chat, "m1", ".ping")])),
        close(DisconnectReason::LoggedOut),
    ]);

    supervisor(factory, SimEnv::new(), config()).run().await.unwrap();

    let replies = client.sent_to(&Jid::new(&chat));
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].body(), "pong");
}

struct CountingSource {
    loads: Arc<AtomicUsize>,
}

impl PluginSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    fn plugins(&self) -> Vec<Result<Box<dyn Plugin>, PluginError>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        BuiltinPlugins.plugins()
    }
}

#[tokio::test]
async fn plugins_load_once_across_reconnects() {
    let loads = Arc::new(AtomicUsize::new(0));
    let factory = SimFactory::new(SimClient::new())
        .session(vec![open(), close(DisconnectReason::RestartRequired)])
        .session(vec![open(), close(DisconnectReason::LoggedOut)]);

    let supervisor = supervisor(factory, SimEnv::new(), config())
        .with_plugins(vec![Box::new(CountingSource { loads: Arc::clone(&loads) })]);
    let router = supervisor.router();
    supervisor.run().await.unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(router.registry().is_some_and(|r| r.find_by_pattern("ping").is_some()));
}

#[tokio::test]
async fn exhausted_script_terminates() {
    let factory = SimFactory::new(SimClient::new());

    let termination = supervisor(factory.clone(), SimEnv::new(), config()).run().await.unwrap();

    assert_eq!(termination.reason, DisconnectReason::LoggedOut);
    assert_eq!(factory.connects(), 1);
}

/// Registers `.slow`, a command that never completes.
struct StuckPlugin;

impl Plugin for StuckPlugin {
    fn name(&self) -> &str {
        "stuck"
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> Result<(), PluginError> {
        registrar.add(
            CommandDescriptor::command("slow"),
            handler_fn(|_, _, _| async {
                std::future::pending::<()>().await;
                Ok::<(), HandlerError>(())
            }),
        );
        Ok(())
    }
}

struct StuckSource;

impl PluginSource for StuckSource {
    fn name(&self) -> &str {
        "stuck"
    }

    fn plugins(&self) -> Vec<Result<Box<dyn Plugin>, PluginError>> {
        let mut plugins = BuiltinPlugins.plugins();
        plugins.push(Ok(Box::new(StuckPlugin)));
        plugins
    }
}

fn short_drain(config: BotConfig) -> BotConfig {
    BotConfig { drain_timeout: Duration::from_millis(50), ..config }
}

#[tokio::test]
async fn stuck_handler_does_not_block_reconnect() {
    let chat = user("1");
    let factory = SimFactory::new(SimClient::new())
        .session(vec![
            open(),
            inbound(upsert(vec![private_text(&chat, "m1", ".slow")])),
            close(DisconnectReason::TransientNetwork),
        ])
        .session(vec![open(), close(DisconnectReason::LoggedOut)]);

    let supervisor = supervisor(factory.clone(), SimEnv::new(), short_drain(config()))
        .with_plugins(vec![Box::new(StuckSource)]);
    let termination =
        tokio::time::timeout(Duration::from_secs(5), supervisor.run()).await.unwrap().unwrap();

    assert_eq!(factory.connects(), 2);
    assert_eq!(termination.reconnects, 1);
    assert_eq!(termination.reason, DisconnectReason::LoggedOut);
}

#[tokio::test]
async fn close_is_read_while_every_permit_is_held() {
    let chat = user("1");
    let factory = SimFactory::new(SimClient::new())
        .session(vec![
            open(),
            inbound(upsert(vec![private_text(&chat, "m1", ".slow")])),
            inbound(upsert(vec![private_text(&chat, "m2", ".slow")])),
            inbound(upsert(vec![private_text(&chat, "m3", ".ping")])),
            close(DisconnectReason::TransientNetwork),
        ])
        .session(vec![open(), close(DisconnectReason::LoggedOut)]);
    let config = BotConfig { max_concurrent_events: 1, ..short_drain(config()) };

    let supervisor = supervisor(factory.clone(), SimEnv::new(), config)
        .with_plugins(vec![Box::new(StuckSource)]);
    let termination =
        tokio::time::timeout(Duration::from_secs(5), supervisor.run()).await.unwrap().unwrap();

    assert_eq!(factory.connects(), 2);
    assert_eq!(termination.reason, DisconnectReason::LoggedOut);
}

#[tokio::test]
async fn queued_events_are_served_before_reconnect() {
    let client = SimClient::new();
    let chat = user("1");
    let factory = SimFactory::new(client.clone()).session(vec![
        open(),
        inbound(upsert(vec![private_text(&chat, "m1", ".ping")])),
        inbound(upsert(vec![private_text(&chat, "m2", ".ping")])),
        inbound(upsert(vec![private_text(&chat, "m3", ".ping")])),
        close(DisconnectReason::LoggedOut),
    ]);
    let config = BotConfig { max_concurrent_events: 1, ..config() };

    supervisor(factory, SimEnv::new(), config).run().await.unwrap();

    let replies = client.sent_to(&Jid::new(&chat));
    assert_eq!(replies.len(), 3);
    assert!(replies.iter().all(|reply| reply.body() == "pong"));
}

#[tokio::test]
async fn snapshots_follow_the_environment_clock() {
    let env = SimEnv::new();
    let client = SimClient::new();
    let period = Duration::from_secs(30);

    let task = tokio::spawn(write_snapshots(env.clone(), Arc::new(client.clone()), period));
    while client.snapshots() < 3 {
        tokio::task::yield_now().await;
    }
    task.abort();

    let sleeps = env.sleeps();
    assert!(sleeps.len() >= 3);
    assert!(sleeps.iter().all(|sleep| *sleep == period));
}

fn transient_reason() -> impl Strategy<Value = DisconnectReason> {
    prop_oneof![
        Just(DisconnectReason::TransientNetwork),
        Just(DisconnectReason::RestartRequired),
        Just(DisconnectReason::Unknown),
    ]
}

proptest! {
    #[test]
    fn prop_every_transient_close_reconnects(
        reasons in prop::collection::vec(transient_reason(), 0..8),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        let mut factory = SimFactory::new(SimClient::new());
        for reason in &reasons {
            factory = factory.session(vec![open(), close(*reason)]);
        }
        factory = factory.session(vec![open(), close(DisconnectReason::LoggedOut)]);

        let env = SimEnv::new();
        let termination = runtime
            .block_on(supervisor(factory.clone(), env.clone(), config()).run())
            .unwrap();

        prop_assert_eq!(factory.connects(), reasons.len() + 1);
        prop_assert_eq!(termination.reconnects, reasons.len() as u64);
        prop_assert_eq!(env.sleeps().len(), reasons.len());
    }
}
