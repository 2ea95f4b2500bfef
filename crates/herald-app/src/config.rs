//! Runtime configuration.

use std::{path::PathBuf, time::Duration};

use herald_core::{AntiFraudPolicy, Jid, ReconnectPolicy};

/// Delay between session start and the pairing code request.
pub const PAIRING_CODE_DELAY: Duration = Duration::from_secs(3);

/// Default interval between provider cache snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on concurrently processed inbound events.
pub const DEFAULT_MAX_CONCURRENT_EVENTS: usize = 64;

/// Default time in-flight events get to finish after a session closes.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Avatar sent when a member has no retrievable profile picture.
pub const DEFAULT_AVATAR_URL: &str = "https://i.ibb.co/Tq7d7TZ/avatar.png";

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Command prefixes, tried in order
    pub prefixes: Vec<String>,
    /// Phone number to request a pairing code for when credentials are not
    /// registered
    pub pairing_number: Option<String>,
    /// Owner notified after every successful connection
    pub owner: Option<Jid>,
    /// Calling codes rejected from every group
    pub antifraud_denylist: Vec<u16>,
    /// Name used in the startup notice
    pub bot_name: String,
    /// Version used in the startup notice
    pub version: String,
    /// Reconnect delays
    pub reconnect: ReconnectPolicy,
    /// Provider cache snapshot interval. Zero disables snapshots.
    pub snapshot_interval: Duration,
    /// Fallback avatar for members without a profile picture
    pub default_avatar_url: String,
    /// Inbound events processed concurrently before backpressure
    pub max_concurrent_events: usize,
    /// How long a closed session waits for in-flight events before aborting
    /// them
    pub drain_timeout: Duration,
    /// Directory of JSON plugin manifests
    pub plugin_dir: Option<PathBuf>,
    /// Database file. `None` keeps state in memory.
    pub db_path: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefixes: vec![".".to_string()],
            pairing_number: None,
            owner: None,
            antifraud_denylist: Vec::new(),
            bot_name: "Herald".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            reconnect: ReconnectPolicy::default(),
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            default_avatar_url: DEFAULT_AVATAR_URL.to_string(),
            max_concurrent_events: DEFAULT_MAX_CONCURRENT_EVENTS,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            plugin_dir: None,
            db_path: None,
        }
    }
}

impl BotConfig {
    /// Global anti-fraud policy built from the denylist.
    pub fn antifraud_policy(&self) -> AntiFraudPolicy {
        AntiFraudPolicy::new(self.antifraud_denylist.iter().copied())
    }

    /// Notice sent to the owner after each successful connection.
    pub fn startup_notice(&self) -> String {
        format!("_{} has started successfully!_\n_Version: {}_", self.bot_name, self.version)
    }

    /// Prefix shown in help output.
    pub fn primary_prefix(&self) -> &str {
        self.prefixes.first().map_or("", String::as_str)
    }
}
