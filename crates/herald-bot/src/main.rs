//! Herald bot binary.
//!
//! # Usage
//!
//! ```bash
//! # Console session with in-memory state
//! herald --owner 15550001111
//!
//! # Persistent settings, manifest plugins and an anti-fraud denylist
//! herald --db herald.redb --plugins ./plugins --deny-codes 212,92
//! ```

mod console;

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use herald_app::{
    BotConfig, ConnectionSupervisor, ContactStore, GroupConfigStore, MemoryStore, RedbStore,
    SystemEnv,
};
use herald_core::{Jid, ReconnectPolicy, antifraud::parse_codes};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::console::ConsoleFactory;

/// Herald messaging bot
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(about = "Long-running group messaging bot")]
#[command(version)]
struct Args {
    /// Command prefix (repeat for several)
    #[arg(short, long = "prefix", default_value = ".")]
    prefixes: Vec<String>,

    /// Owner notified on every successful connection (number or identifier)
    #[arg(long)]
    owner: Option<String>,

    /// Request a pairing code for this number when not registered
    #[arg(long)]
    pairing_number: Option<String>,

    /// Calling codes rejected from every group, comma separated
    #[arg(long, default_value = "")]
    deny_codes: String,

    /// Name used in the startup notice
    #[arg(long, default_value = "Herald")]
    bot_name: String,

    /// Database file for group settings and contacts (in memory if unset)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Directory of JSON plugin manifests
    #[arg(long)]
    plugins: Option<PathBuf>,

    /// Base reconnect delay in milliseconds (0 retries immediately)
    #[arg(long, default_value = "0")]
    reconnect_base_ms: u64,

    /// Cache snapshot interval in seconds (0 disables)
    #[arg(long, default_value = "30")]
    snapshot_secs: u64,

    /// Maximum inbound events processed concurrently
    #[arg(long, default_value = "64")]
    max_concurrent_events: usize,

    /// Seconds a closed session waits for in-flight events
    #[arg(long, default_value = "5")]
    drain_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> BotConfig {
        let defaults = BotConfig::default();
        BotConfig {
            prefixes: self.prefixes.clone(),
            pairing_number: self.pairing_number.clone(),
            owner: self.owner.as_deref().map(Jid::parse_destination),
            antifraud_denylist: parse_codes(&self.deny_codes),
            bot_name: self.bot_name.clone(),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(self.reconnect_base_ms),
                ..defaults.reconnect
            },
            snapshot_interval: Duration::from_secs(self.snapshot_secs),
            max_concurrent_events: self.max_concurrent_events,
            drain_timeout: Duration::from_secs(self.drain_secs),
            plugin_dir: self.plugins.clone(),
            db_path: self.db.clone(),
            ..defaults
        }
    }
}

type Stores = (Arc<dyn GroupConfigStore>, Arc<dyn ContactStore>);

fn open_stores(config: &BotConfig) -> Result<Stores, herald_app::StoreError> {
    match &config.db_path {
        Some(path) => {
            let store = RedbStore::open(path)?;
            tracing::info!("Using database {}", path.display());
            Ok((Arc::new(store.clone()), Arc::new(store)))
        },
        None => {
            tracing::warn!("No database configured, settings are kept in memory");
            let store = MemoryStore::new();
            Ok((Arc::new(store.clone()), Arc::new(store)))
        },
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = args.config();
    let (groups, contacts) = open_stores(&config)?;

    let factory = ConsoleFactory::new();
    let supervisor = ConnectionSupervisor::new(factory, SystemEnv::new(), config, groups, contacts);
    let termination = supervisor.run().await?;

    tracing::info!(
        "Stopped after {} connection(s): {}",
        termination.connections,
        termination.reason
    );

    if termination.reason == herald_core::DisconnectReason::LoggedOut {
        return Ok(ExitCode::SUCCESS);
    }
    Ok(ExitCode::FAILURE)
}
