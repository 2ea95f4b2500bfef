//! Recording session client.

#![allow(clippy::disallowed_types, reason = "Locking simple recorder state")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use herald_app::{SessionClient, SessionError};
use herald_core::{GroupMetadata, Jid, OutboundContent};

/// A message the bot sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Destination chat
    pub to: Jid,
    /// Content as sent
    pub content: OutboundContent,
}

impl SentMessage {
    /// Text or caption.
    pub fn body(&self) -> &str {
        self.content.body()
    }
}

/// Session client double.
///
/// Records every outbound request. Group metadata and profile pictures are
/// served from what the test configured; unknown groups and members fail
/// like the provider does. Clones share state, so a test keeps one handle
/// while the supervisor owns another.
#[derive(Clone)]
pub struct SimClient {
    state: Arc<Mutex<SimClientState>>,
}

struct SimClientState {
    registered: bool,
    own_id: Option<Jid>,
    pairing_code: String,
    groups: HashMap<Jid, GroupMetadata>,
    pictures: HashMap<Jid, String>,
    metadata_failures: usize,
    fail_sends: bool,
    sent: Vec<SentMessage>,
    removed: Vec<(Jid, Jid)>,
    metadata_requests: usize,
    pairing_requests: Vec<String>,
    credential_writes: usize,
    snapshots: usize,
}

impl Default for SimClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClient {
    /// Registered client with no groups.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimClientState {
                registered: true,
                own_id: None,
                pairing_code: String::new(),
                groups: HashMap::new(),
                pictures: HashMap::new(),
                metadata_failures: 0,
                fail_sends: false,
                sent: Vec::new(),
                removed: Vec::new(),
                metadata_requests: 0,
                pairing_requests: Vec::new(),
                credential_writes: 0,
                snapshots: 0,
            })),
        }
    }

    #[allow(clippy::expect_used)]
    fn state(&self) -> MutexGuard<'_, SimClientState> {
        self.state.lock().expect("SimClient mutex poisoned")
    }

    /// Serve metadata for a group.
    #[must_use]
    pub fn with_group(self, metadata: GroupMetadata) -> Self {
        self.state().groups.insert(metadata.id.clone(), metadata);
        self
    }

    /// Serve a profile picture for a member.
    #[must_use]
    pub fn with_picture(self, member: &Jid, url: &str) -> Self {
        self.state().pictures.insert(member.clone(), url.to_string());
        self
    }

    /// Set the bot's own identity.
    #[must_use]
    pub fn with_own_id(self, id: Jid) -> Self {
        self.state().own_id = Some(id);
        self
    }

    /// Credentials not yet registered; pairing requests return `code`.
    #[must_use]
    pub fn unregistered(self, code: &str) -> Self {
        {
            let mut state = self.state();
            state.registered = false;
            state.pairing_code = code.to_string();
        }
        self
    }

    /// Fail the next `times` metadata requests.
    pub fn fail_metadata(&self, times: usize) {
        self.state().metadata_failures = times;
    }

    /// Fail every send while `fail` is set.
    pub fn fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    /// Every message sent, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Messages sent to `chat`, in order.
    pub fn sent_to(&self, chat: &Jid) -> Vec<SentMessage> {
        self.state().sent.iter().filter(|m| &m.to == chat).cloned().collect()
    }

    /// Removal requests as (group, member), in order.
    pub fn removed(&self) -> Vec<(Jid, Jid)> {
        self.state().removed.clone()
    }

    /// Metadata requests made, failed or not.
    pub fn metadata_requests(&self) -> usize {
        self.state().metadata_requests
    }

    /// Phone numbers pairing codes were requested for.
    pub fn pairing_requests(&self) -> Vec<String> {
        self.state().pairing_requests.clone()
    }

    /// Credential persist requests.
    pub fn credential_writes(&self) -> usize {
        self.state().credential_writes
    }

    /// Cache snapshot writes.
    pub fn snapshots(&self) -> usize {
        self.state().snapshots
    }
}

#[async_trait]
impl SessionClient for SimClient {
    async fn send_message(&self, to: &Jid, content: OutboundContent) -> Result<(), SessionError> {
        let mut state = self.state();
        if state.fail_sends {
            return Err(SessionError::Request("send failed".to_string()));
        }
        state.sent.push(SentMessage { to: to.clone(), content });
        Ok(())
    }

    async fn group_metadata(&self, group: &Jid) -> Result<GroupMetadata, SessionError> {
        let mut state = self.state();
        state.metadata_requests += 1;
        if state.metadata_failures > 0 {
            state.metadata_failures -= 1;
            return Err(SessionError::Request("metadata unavailable".to_string()));
        }
        state
            .groups
            .get(group)
            .cloned()
            .ok_or_else(|| SessionError::Request(format!("unknown group {group}")))
    }

    async fn profile_picture_url(&self, member: &Jid) -> Result<String, SessionError> {
        self.state()
            .pictures
            .get(member)
            .cloned()
            .ok_or_else(|| SessionError::Request(format!("no picture for {member}")))
    }

    async fn remove_participants(&self, group: &Jid, members: &[Jid]) -> Result<(), SessionError> {
        let mut state = self.state();
        state.removed.extend(members.iter().map(|m| (group.clone(), m.clone())));
        Ok(())
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, SessionError> {
        let mut state = self.state();
        state.pairing_requests.push(phone_number.to_string());
        Ok(state.pairing_code.clone())
    }

    fn is_registered(&self) -> bool {
        self.state().registered
    }

    fn own_id(&self) -> Option<Jid> {
        self.state().own_id.clone()
    }

    async fn persist_credentials(&self) -> Result<(), SessionError> {
        self.state().credential_writes += 1;
        Ok(())
    }

    async fn write_cache_snapshot(&self) -> Result<(), SessionError> {
        self.state().snapshots += 1;
        Ok(())
    }
}
