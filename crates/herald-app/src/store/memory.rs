//! In-memory store.
//!
//! Group settings and contacts kept in hash maps behind a mutex. Used in tests and
//! by the bot when no database file is configured.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use herald_core::{GroupConfig, GroupConfigUpdate, Jid};

use super::{ContactRecord, ContactStore, GroupConfigStore};
use crate::error::StoreError;

/// In-memory store for tests, simulation and runs without a database path.
///
/// Clones share the same maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    groups: HashMap<Jid, GroupConfig>,
    contacts: HashMap<Jid, ContactRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of groups with a stored record.
    pub fn group_count(&self) -> usize {
        self.lock().map(|inner| inner.groups.len()).unwrap_or(0)
    }

    /// Number of known contacts.
    pub fn contact_count(&self) -> usize {
        self.lock().map(|inner| inner.contacts.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Io("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl GroupConfigStore for MemoryStore {
    async fn find_by_group_id(&self, group: &Jid) -> Result<Option<GroupConfig>, StoreError> {
        Ok(self.lock()?.groups.get(group).cloned())
    }

    async fn upsert(
        &self,
        group: &Jid,
        update: GroupConfigUpdate,
    ) -> Result<GroupConfig, StoreError> {
        let mut inner = self.lock()?;
        let config =
            inner.groups.entry(group.clone()).or_insert_with(|| GroupConfig::new(group.clone()));
        config.apply(update);
        Ok(config.clone())
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn upsert_contact(&self, contact: ContactRecord) -> Result<(), StoreError> {
        self.lock()?.contacts.insert(contact.id.clone(), contact);
        Ok(())
    }

    async fn find_contact(&self, id: &Jid) -> Result<Option<ContactRecord>, StoreError> {
        Ok(self.lock()?.contacts.get(id).cloned())
    }
}
