//! Storage for per-group automation settings and contacts.
//!
//! Store calls are suspension points in the event pipeline and may fail
//! independently. Implementations share state internally, so they are held
//! as `Arc<dyn ...>` and shared across tasks. Writes to one record are
//! serialized by the backend.

mod chaotic;
mod memory;
mod redb;

use async_trait::async_trait;
pub use chaotic::{ChaoticStore, StoreOp};
use herald_core::{GroupConfig, GroupConfigUpdate, Jid};
pub use memory::MemoryStore;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStore;
use crate::error::StoreError;

/// Contact known to the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Contact identity
    pub id: Jid,
    /// Self-chosen display name, if the provider sent one
    pub name: Option<String>,
}

/// Per-group automation settings keyed by group identity.
///
/// At most one record per group.
#[async_trait]
pub trait GroupConfigStore: Send + Sync + 'static {
    /// Settings for `group`, `None` if automation was never configured there.
    async fn find_by_group_id(&self, group: &Jid) -> Result<Option<GroupConfig>, StoreError>;

    /// Apply `update` to the record for `group`, creating it with defaults
    /// first if absent. Returns the stored record.
    async fn upsert(
        &self,
        group: &Jid,
        update: GroupConfigUpdate,
    ) -> Result<GroupConfig, StoreError>;
}

/// Contact directory fed by provider contact syncs.
#[async_trait]
pub trait ContactStore: Send + Sync + 'static {
    /// Insert the contact or overwrite its name.
    async fn upsert_contact(&self, contact: ContactRecord) -> Result<(), StoreError>;

    /// Look up a contact by identity.
    async fn find_contact(&self, id: &Jid) -> Result<Option<ContactRecord>, StoreError>;
}
