//! Per-context pool registry.

use super::{PoolKey, SessionPool};
use crate::errors::{Result, SessionError};
use crate::session::{ContextRef, SessionKind};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The pools owned by one context, at most one per [`PoolKey`].
#[derive(Debug)]
pub struct SessionPoolContainer {
    owner: ContextRef,
    pools: DashMap<PoolKey, Arc<SessionPool>>,
    disposed: AtomicBool,
}

impl SessionPoolContainer {
    pub(crate) fn new(owner: ContextRef) -> Self {
        Self {
            owner,
            pools: DashMap::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Registers a pool.
    ///
    /// # Errors
    ///
    /// Fails if a pool with the same key exists or the container is disposed.
    pub fn add(&self, pool: Arc<SessionPool>) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(SessionError::disposed(format!("pools of {}", self.owner.label())));
        }
        match self.pools.entry(pool.key().clone()) {
            Entry::Occupied(_) => Err(SessionError::duplicate_pool(pool.key().to_string(), self.owner.label())),
            Entry::Vacant(slot) => {
                slot.insert(pool);
                Ok(())
            }
        }
    }

    /// Returns the pool for a kind and optional name.
    ///
    /// # Errors
    ///
    /// Fails with a pool-not-found error naming this context.
    pub fn get(&self, kind: &SessionKind, name: Option<&str>) -> Result<Arc<SessionPool>> {
        self.get_or_none(kind, name)
            .ok_or_else(|| SessionError::pool_not_found(kind.describe(name), self.owner.label()))
    }

    /// Returns the pool for a kind and optional name, if any.
    ///
    /// Without a name, the unnamed pool is preferred and any pool of the kind
    /// is accepted otherwise.
    pub fn get_or_none(&self, kind: &SessionKind, name: Option<&str>) -> Option<Arc<SessionPool>> {
        let key = PoolKey::new(kind.clone(), name.map(str::to_string));
        if let Some(pool) = self.pools.get(&key) {
            return Some(pool.value().clone());
        }
        if name.is_some() {
            return None;
        }
        self.pools
            .iter()
            .find(|entry| &entry.key().kind == kind)
            .map(|entry| entry.value().clone())
    }

    /// Snapshot of all pools.
    pub fn pools(&self) -> Vec<Arc<SessionPool>> {
        self.pools.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Returns the number of pools.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns true if there are no pools.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Disposes every pool, collecting teardown failures.
    pub async fn dispose(&self) -> Vec<SessionError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        let pools = self.pools();
        self.pools.clear();

        let mut failures = Vec::new();
        for pool in pools {
            failures.extend(pool.dispose().await);
        }
        failures
    }
}
