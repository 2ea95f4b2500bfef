//! Scripted session factory.

#![allow(clippy::disallowed_types, reason = "Locking simple script queue")]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use herald_app::{Session, SessionError, SessionFactory};
use herald_core::{DisconnectReason, SessionEvent};
use tokio::sync::mpsc;

use crate::sim_client::SimClient;

/// What one `connect` call yields.
#[derive(Debug, Clone)]
pub enum SessionScript {
    /// A session delivering these events, then ending its stream
    Events(Vec<SessionEvent>),
    /// A failed connection attempt
    Fail(SessionError),
}

/// Factory handing out scripted sessions in order.
///
/// Every session shares the same [`SimClient`]. Once the scripts run out,
/// `connect` fails with a logged-out close so supervision always ends.
#[derive(Clone)]
pub struct SimFactory {
    client: SimClient,
    scripts: Arc<Mutex<VecDeque<SessionScript>>>,
    connects: Arc<AtomicUsize>,
}

impl SimFactory {
    /// Factory with no scripts.
    pub fn new(client: SimClient) -> Self {
        Self {
            client,
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a session delivering `events`.
    #[must_use]
    pub fn session(self, events: Vec<SessionEvent>) -> Self {
        self.push(SessionScript::Events(events));
        self
    }

    /// Queue a failed connection attempt.
    #[must_use]
    pub fn fail(self, error: SessionError) -> Self {
        self.push(SessionScript::Fail(error));
        self
    }

    /// `connect` calls so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Client shared by every session.
    pub fn client(&self) -> &SimClient {
        &self.client
    }

    fn push(&self, script: SessionScript) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(script);
        }
    }

    fn next_script(&self) -> Option<SessionScript> {
        self.scripts.lock().ok().and_then(|mut scripts| scripts.pop_front())
    }
}

#[async_trait]
impl SessionFactory for SimFactory {
    async fn connect(&mut self) -> Result<Session, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let events = match self.next_script() {
            Some(SessionScript::Events(events)) => events,
            Some(SessionScript::Fail(error)) => return Err(error),
            None => {
                tracing::debug!("SimFactory scripts exhausted");
                return Err(SessionError::Closed { reason: DisconnectReason::LoggedOut });
            },
        };

        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            if tx.try_send(event).is_err() {
                return Err(SessionError::Connect("script channel full".to_string()));
            }
        }

        Ok(Session { client: Arc::new(self.client.clone()), events: rx })
    }
}
