//! Fault-injecting store.
//!
//! Wraps any store and fails chosen calls, either a seeded fraction of them
//! or an explicit burst, so tests can check that a broken store is contained
//! to the event that hit it.

#![allow(clippy::disallowed_types, reason = "Locking simple fault state")]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use herald_core::{GroupConfig, GroupConfigUpdate, Jid};

use super::{ContactRecord, ContactStore, GroupConfigStore};
use crate::error::StoreError;

/// Store call a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `GroupConfigStore::find_by_group_id`
    FindGroup,
    /// `GroupConfigStore::upsert`
    UpsertGroup,
    /// `ContactStore::upsert_contact`
    UpsertContact,
    /// `ContactStore::find_contact`
    FindContact,
}

/// Store wrapper that injects failures.
///
/// A call fails when a burst from [`fail_next`](Self::fail_next) is pending,
/// or else with probability `failure_rate`. Only targeted operations are
/// affected (all of them by default). Clones share the fault state.
#[derive(Clone)]
pub struct ChaoticStore<S> {
    inner: S,
    faults: Arc<Mutex<Faults>>,
}

struct Faults {
    failure_rate: f64,
    targets: Option<HashSet<StoreOp>>,
    burst: usize,
    rng: u64,
    calls: usize,
    injected: usize,
}

impl Faults {
    /// xorshift64* mapped to [0.0, 1.0)
    fn roll(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        (x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11) as f64 / (1u64 << 53) as f64
    }

    fn fails(&mut self, op: StoreOp) -> bool {
        self.calls += 1;
        if self.targets.as_ref().is_some_and(|targets| !targets.contains(&op)) {
            return false;
        }

        let fail = if self.burst > 0 {
            self.burst -= 1;
            true
        } else {
            self.roll() < self.failure_rate
        };
        if fail {
            self.injected += 1;
        }
        fail
    }
}

impl<S> ChaoticStore<S> {
    /// Wrap `inner`, failing calls with probability `failure_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x9E37_79B9_7F4A_7C15)
    }

    /// Same as [`new`](Self::new) with an explicit seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        let faults = Faults {
            failure_rate,
            targets: None,
            burst: 0,
            rng: seed.max(1),
            calls: 0,
            injected: 0,
        };
        Self { inner, faults: Arc::new(Mutex::new(faults)) }
    }

    /// Restrict faults to `ops`.
    #[must_use]
    pub fn only(self, ops: impl IntoIterator<Item = StoreOp>) -> Self {
        if let Ok(mut faults) = self.faults.lock() {
            faults.targets = Some(ops.into_iter().collect());
        }
        self
    }

    /// Fail the next `count` targeted calls regardless of the rate.
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.burst = count;
        }
    }

    /// Underlying store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Calls made, failed or not.
    pub fn calls(&self) -> usize {
        self.faults.lock().map(|faults| faults.calls).unwrap_or(0)
    }

    /// Calls failed by injection.
    pub fn injected(&self) -> usize {
        self.faults.lock().map(|faults| faults.injected).unwrap_or(0)
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        let fail = self.faults.lock().map(|mut faults| faults.fails(op)).unwrap_or(false);
        if fail {
            return Err(StoreError::Io(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: GroupConfigStore> GroupConfigStore for ChaoticStore<S> {
    async fn find_by_group_id(&self, group: &Jid) -> Result<Option<GroupConfig>, StoreError> {
        self.check(StoreOp::FindGroup)?;
        self.inner.find_by_group_id(group).await
    }

    async fn upsert(
        &self,
        group: &Jid,
        update: GroupConfigUpdate,
    ) -> Result<GroupConfig, StoreError> {
        self.check(StoreOp::UpsertGroup)?;
        self.inner.upsert(group, update).await
    }
}

#[async_trait]
impl<S: ContactStore> ContactStore for ChaoticStore<S> {
    async fn upsert_contact(&self, contact: ContactRecord) -> Result<(), StoreError> {
        self.check(StoreOp::UpsertContact)?;
        self.inner.upsert_contact(contact).await
    }

    async fn find_contact(&self, id: &Jid) -> Result<Option<ContactRecord>, StoreError> {
        self.check(StoreOp::FindContact)?;
        self.inner.find_contact(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn group() -> Jid {
        Jid::new("1@g.us")
    }

    #[tokio::test]
    async fn zero_rate_never_fails() {
        let store = ChaoticStore::new(MemoryStore::new(), 0.0);
        for _ in 0..100 {
            store.find_by_group_id(&group()).await.unwrap();
        }
        assert_eq!(store.calls(), 100);
        assert_eq!(store.injected(), 0);
    }

    #[tokio::test]
    async fn full_rate_fails_before_reaching_inner_store() {
        let store = ChaoticStore::new(MemoryStore::new(), 1.0);
        let result = store.upsert(&group(), GroupConfigUpdate::default()).await;

        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(store.inner().group_count(), 0);
    }

    #[tokio::test]
    async fn burst_fails_exactly_that_many_calls() {
        let store = ChaoticStore::new(MemoryStore::new(), 0.0);
        store.fail_next(2);

        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(store.find_by_group_id(&group()).await.is_ok());
        }

        assert_eq!(results, vec![false, false, true, true]);
        assert_eq!(store.injected(), 2);
    }

    #[tokio::test]
    async fn untargeted_operations_pass_through() {
        let store = ChaoticStore::new(MemoryStore::new(), 1.0).only([StoreOp::UpsertContact]);

        store.upsert(&group(), GroupConfigUpdate::default()).await.unwrap();
        let contact = ContactRecord { id: Jid::user("1"), name: None };

        assert!(store.upsert_contact(contact).await.is_err());
        assert_eq!(store.calls(), 2);
        assert_eq!(store.injected(), 1);
    }

    #[tokio::test]
    async fn same_seed_same_failures() {
        let a = ChaoticStore::with_seed(MemoryStore::new(), 0.5, 7);
        let b = ChaoticStore::with_seed(MemoryStore::new(), 0.5, 7);

        let mut outcomes = (Vec::new(), Vec::new());
        for _ in 0..32 {
            outcomes.0.push(a.find_by_group_id(&group()).await.is_ok());
            outcomes.1.push(b.find_by_group_id(&group()).await.is_ok());
        }

        assert_eq!(outcomes.0, outcomes.1);
        assert!(outcomes.0.contains(&false));
        assert!(outcomes.0.contains(&true));
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between")]
    fn rejects_invalid_rate() {
        let _ = ChaoticStore::new(MemoryStore::new(), 1.5);
    }
}
