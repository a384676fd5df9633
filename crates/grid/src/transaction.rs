//! Grid-local transactions
//!
//! Each context has at most one local transaction. Writes are buffered in
//! the transaction and applied atomically on commit; nothing is visible to
//! other contexts before that.

use crate::error::{GridError, Result};
use crate::storage::{Entry, RegionStore};
use crate::value::Value;
use lrco_common::ContextId;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Region name -> committed data
pub(crate) type Regions = RwLock<HashMap<String, Arc<RegionStore>>>;

/// Grid transaction identifier (UUIDv7, time ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridTxId(Uuid);

impl GridTxId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GridTxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GridTxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct PendingWrite {
    value: Option<Value>,
    base_version: u64,
}

#[derive(Debug)]
struct TxState {
    id: GridTxId,
    writes: BTreeMap<(String, String), PendingWrite>,
    /// Driven by a foreign coordinator through a last-resource adapter
    externally_coordinated: bool,
    /// Completed through a synchronization registered by the grid itself
    synchronized: bool,
}

/// Manages the per-context local transactions of one cache
pub struct GridTxManager {
    cache_name: String,
    closed: Arc<AtomicBool>,
    regions: Arc<Regions>,
    conflict_detection: bool,
    states: Mutex<HashMap<ContextId, TxState>>,
}

impl GridTxManager {
    pub(crate) fn new(
        cache_name: String,
        closed: Arc<AtomicBool>,
        regions: Arc<Regions>,
        conflict_detection: bool,
    ) -> Self {
        Self {
            cache_name,
            closed,
            regions,
            conflict_detection,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Begin a local transaction for `context`
    pub fn begin(&self, context: ContextId) -> Result<GridTxId> {
        self.ensure_open()?;

        let mut states = self.states.lock();
        if let Some(state) = states.get(&context) {
            return Err(GridError::AlreadyActive {
                context,
                current: state.id,
            });
        }

        let id = GridTxId::new();
        states.insert(
            context,
            TxState {
                id,
                writes: BTreeMap::new(),
                externally_coordinated: false,
                synchronized: false,
            },
        );
        tracing::debug!(cache = %self.cache_name, %context, tx = %id, "Began grid transaction");
        Ok(id)
    }

    /// Transaction currently associated with `context`
    pub fn current(&self, context: ContextId) -> Option<GridTxId> {
        self.states.lock().get(&context).map(|s| s.id)
    }

    /// Tag the transaction as driven by a foreign coordinator, which stops
    /// the grid from registering its own synchronization for it
    pub fn mark_externally_coordinated(&self, context: ContextId, id: GridTxId) -> Result<()> {
        let mut states = self.states.lock();
        let state = Self::matching(&mut states, context, id)?;
        state.externally_coordinated = true;
        Ok(())
    }

    pub fn is_externally_coordinated(&self, context: ContextId) -> bool {
        self.states
            .lock()
            .get(&context)
            .is_some_and(|s| s.externally_coordinated)
    }

    pub fn is_synchronized(&self, context: ContextId) -> bool {
        self.states
            .lock()
            .get(&context)
            .is_some_and(|s| s.synchronized)
    }

    /// Number of in-flight transactions
    pub fn active_count(&self) -> usize {
        self.states.lock().len()
    }

    /// Drop every in-flight transaction, returning how many were dropped
    pub(crate) fn clear(&self) -> usize {
        let dropped = self.states.lock().drain().count();
        if dropped > 0 {
            tracing::debug!(cache = %self.cache_name, dropped, "Dropped in-flight grid transactions");
        }
        dropped
    }

    /// Check that `id` could commit without conflicts
    pub fn validate(&self, context: ContextId, id: GridTxId) -> Result<()> {
        let mut states = self.states.lock();
        let state = Self::matching(&mut states, context, id)?;
        if !self.conflict_detection {
            return Ok(());
        }

        let regions = self.regions.read();
        for ((region, key), write) in &state.writes {
            let current = regions.get(region).map_or(0, |store| store.version(key));
            if current != write.base_version {
                return Err(GridError::CommitConflict {
                    region: region.clone(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Commit transaction `id` of `context`. The transaction is ended even if
    /// the commit fails on a conflict.
    pub fn commit(&self, context: ContextId, id: GridTxId) -> Result<()> {
        self.ensure_open()?;
        let state = self.take(context, id)?;

        let stores: Vec<(String, Arc<RegionStore>)> = {
            let names: BTreeSet<&String> = state.writes.keys().map(|(r, _)| r).collect();
            let regions = self.regions.read();
            names
                .into_iter()
                .filter_map(|name| regions.get(name).map(|s| (name.clone(), s.clone())))
                .collect()
        };

        // Region locks are taken in name order
        let mut guards: HashMap<&str, RwLockWriteGuard<'_, HashMap<String, Entry>>> =
            stores
                .iter()
                .map(|(name, store)| (name.as_str(), store.entries.write()))
                .collect();

        if self.conflict_detection {
            for ((region, key), write) in &state.writes {
                let current = guards
                    .get(region.as_str())
                    .and_then(|entries| entries.get(key))
                    .map_or(0, |e| e.version);
                if current != write.base_version {
                    tracing::debug!(tx = %id, %region, %key, "Commit conflict");
                    return Err(GridError::CommitConflict {
                        region: region.clone(),
                        key: key.clone(),
                    });
                }
            }
        }

        for ((region, key), write) in state.writes {
            if let Some(entries) = guards.get_mut(region.as_str()) {
                let entry = entries.entry(key).or_insert(Entry {
                    value: None,
                    version: 0,
                });
                entry.value = write.value;
                entry.version += 1;
            }
        }

        tracing::debug!(cache = %self.cache_name, %context, tx = %id, "Committed grid transaction");
        Ok(())
    }

    /// Discard transaction `id` of `context`
    pub fn rollback(&self, context: ContextId, id: GridTxId) -> Result<()> {
        let state = self.take(context, id)?;
        tracing::debug!(
            cache = %self.cache_name,
            %context,
            tx = %id,
            writes = state.writes.len(),
            "Rolled back grid transaction"
        );
        Ok(())
    }

    pub(crate) fn mark_synchronized(&self, context: ContextId, id: GridTxId) -> Result<()> {
        let mut states = self.states.lock();
        Self::matching(&mut states, context, id)?.synchronized = true;
        Ok(())
    }

    /// Buffer a write in the transaction of `context`, returning the value
    /// the transaction saw before it
    pub(crate) fn stage(
        &self,
        context: ContextId,
        region: &str,
        store: &RegionStore,
        key: String,
        value: Option<Value>,
    ) -> Result<Option<Value>> {
        let mut states = self.states.lock();
        let state = states
            .get_mut(&context)
            .ok_or(GridError::NoActiveTransaction(context))?;

        let slot = (region.to_string(), key);
        match state.writes.get_mut(&slot) {
            Some(pending) => Ok(std::mem::replace(&mut pending.value, value)),
            None => {
                let previous = store.get(&slot.1);
                let base_version = store.version(&slot.1);
                state.writes.insert(
                    slot,
                    PendingWrite {
                        value,
                        base_version,
                    },
                );
                Ok(previous)
            }
        }
    }

    /// Uncommitted value of `key` in the transaction of `context`.
    /// `Some(None)` means the transaction removed it.
    pub(crate) fn pending(&self, context: ContextId, region: &str, key: &str) -> Option<Option<Value>> {
        let states = self.states.lock();
        let state = states.get(&context)?;
        state
            .writes
            .get(&(region.to_string(), key.to_string()))
            .map(|w| w.value.clone())
    }

    fn take(&self, context: ContextId, id: GridTxId) -> Result<TxState> {
        let mut states = self.states.lock();
        Self::matching(&mut states, context, id)?;
        states
            .remove(&context)
            .ok_or(GridError::NoActiveTransaction(context))
    }

    fn matching(
        states: &mut HashMap<ContextId, TxState>,
        context: ContextId,
        id: GridTxId,
    ) -> Result<&mut TxState> {
        match states.get_mut(&context) {
            None => Err(GridError::NoActiveTransaction(context)),
            Some(state) if state.id != id => Err(GridError::TransactionMismatch {
                context,
                requested: id,
                current: state.id,
            }),
            Some(state) => Ok(state),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GridError::CacheClosed(self.cache_name.clone()));
        }
        Ok(())
    }
}
