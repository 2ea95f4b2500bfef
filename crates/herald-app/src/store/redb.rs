//! Redb-backed durable storage.
//!
//! Uses Redb's ACID transactions. Group settings and contacts survive
//! restarts. Transactions run on the blocking pool so the event pipeline is
//! never stalled by disk I/O.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use herald_core::{GroupConfig, GroupConfigUpdate, Jid};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use super::{ContactRecord, ContactStore, GroupConfigStore};
use crate::error::StoreError;

/// Table: groups
/// Key: group identity string
/// Value: CBOR-encoded GroupConfig
const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

/// Table: contacts
/// Key: contact identity string
/// Value: CBOR-encoded ContactRecord
const CONTACTS: TableDefinition<&str, &[u8]> = TableDefinition::new("contacts");

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(GROUPS).map_err(|e| StoreError::Io(e.to_string()))?;
            let _ = txn.open_table(CONTACTS).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Run a transaction on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Io(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl GroupConfigStore for RedbStore {
    async fn find_by_group_id(&self, group: &Jid) -> Result<Option<GroupConfig>, StoreError> {
        let key = group.to_string();
        self.blocking(move |db| read(db, GROUPS, &key)).await
    }

    async fn upsert(
        &self,
        group: &Jid,
        update: GroupConfigUpdate,
    ) -> Result<GroupConfig, StoreError> {
        let group = group.clone();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;

            let config = {
                let mut table =
                    txn.open_table(GROUPS).map_err(|e| StoreError::Io(e.to_string()))?;

                let existing: Option<GroupConfig> = table
                    .get(group.as_str())
                    .map_err(|e| StoreError::Io(e.to_string()))?
                    .map(|guard| decode(guard.value()))
                    .transpose()?;

                let mut config = existing.unwrap_or_else(|| GroupConfig::new(group.clone()));
                config.apply(update);

                let bytes = encode(&config)?;
                table
                    .insert(group.as_str(), bytes.as_slice())
                    .map_err(|e| StoreError::Io(e.to_string()))?;
                config
            };

            txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;
            Ok(config)
        })
        .await
    }
}

#[async_trait]
impl ContactStore for RedbStore {
    async fn upsert_contact(&self, contact: ContactRecord) -> Result<(), StoreError> {
        let bytes = encode(&contact)?;
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
            {
                let mut table =
                    txn.open_table(CONTACTS).map_err(|e| StoreError::Io(e.to_string()))?;
                table
                    .insert(contact.id.as_str(), bytes.as_slice())
                    .map_err(|e| StoreError::Io(e.to_string()))?;
            }
            txn.commit().map_err(|e| StoreError::Io(e.to_string()))
        })
        .await
    }

    async fn find_contact(&self, id: &Jid) -> Result<Option<ContactRecord>, StoreError> {
        let key = id.to_string();
        self.blocking(move |db| read(db, CONTACTS, &key)).await
    }
}

fn read<T: DeserializeOwned>(
    db: &Database,
    table: TableDefinition<'static, &'static str, &'static [u8]>,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let txn = db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
    let table = txn.open_table(table).map_err(|e| StoreError::Io(e.to_string()))?;

    let value = table.get(key).map_err(|e| StoreError::Io(e.to_string()))?;
    value.map(|guard| decode(guard.value())).transpose()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}
