//! Last resource driving a store's local transaction
//!
//! The coordinator calls `start` when the adapter is enlisted and, once
//! every two-phase participant has prepared, `commit` with `one_phase` set.
//! The adapter begins exactly one store transaction in `start` and only ever
//! finishes that transaction. `end`, `prepare` and `forget` are protocol
//! violations for a last resource.

use crate::error::{Error, Result};
use crate::store::{StoreErrorKind, StoreLocator, TargetStore};
use lrco_common::{ContextId, Flags, Vote, XaError, XaResource, XaResult, Xid};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

type TxId<L> = <<L as StoreLocator>::Store as TargetStore>::TransactionId;

/// Whether the adapter holds a store transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Unbound,
    Active,
}

/// Conditions the adapter tolerated but recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterWarning {
    /// `commit` was called with `one_phase == false`; it was committed
    /// single-phase anyway
    TwoPhaseCommitRequested(Xid),
}

struct Inner<S: TargetStore> {
    store: Option<Arc<S>>,
    initialized: bool,
    bound: Option<S::TransactionId>,
    warnings: Vec<AdapterWarning>,
}

/// Single-phase resource enlisting a store in a coordinator transaction.
///
/// One instance per enlistment; the coordinator allows at most one last
/// resource per transaction.
pub struct EnlistmentAdapter<L: StoreLocator> {
    locator: Arc<L>,
    context: ContextId,
    inner: Mutex<Inner<L::Store>>,
}

impl<L: StoreLocator> EnlistmentAdapter<L> {
    pub fn new(locator: Arc<L>, context: ContextId) -> Self {
        Self {
            locator,
            context,
            inner: Mutex::new(Inner {
                store: None,
                initialized: false,
                bound: None,
                warnings: Vec::new(),
            }),
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn state(&self) -> ResourceState {
        if self.inner.lock().bound.is_some() {
            ResourceState::Active
        } else {
            ResourceState::Unbound
        }
    }

    /// Store transaction begun by `start` and not yet finished
    pub fn bound_transaction(&self) -> Option<TxId<L>> {
        self.inner.lock().bound
    }

    pub fn warnings(&self) -> Vec<AdapterWarning> {
        self.inner.lock().warnings.clone()
    }

    /// Resolve the store once, and again whenever the cached one was closed
    fn resolve(&self, inner: &mut Inner<L::Store>) -> Result<Arc<L::Store>> {
        if inner.initialized
            && let Some(store) = &inner.store
            && !store.is_closed()
        {
            return Ok(store.clone());
        }

        let store = self.locator.locate().map_err(Error::Unavailable)?;
        tracing::debug!(context = %self.context, reinit = inner.initialized, "Resolved store");
        inner.store = Some(store.clone());
        inner.initialized = true;
        Ok(store)
    }

    fn do_start(&self, xid: &Xid, flags: Flags) -> Result<()> {
        let mut inner = self.inner.lock();
        let store = self.resolve(&mut inner)?;
        tracing::debug!(%xid, %flags, context = %self.context, "start");

        if inner.bound.is_some() {
            return Err(Error::AlreadyActive);
        }

        if !store.has_coordinator_transaction(self.context) {
            tracing::debug!(%xid, context = %self.context, "No coordinator transaction, store not enlisted");
            return Ok(());
        }

        if let Some(current) = store.current_transaction(self.context) {
            return Err(Error::StoreAlreadyAssociated(current.to_string()));
        }

        let tx = store.begin(self.context)?;
        if let Err(e) = store.mark_externally_coordinated(self.context, tx) {
            if let Err(rollback) = store.rollback(self.context, tx) {
                tracing::warn!(%tx, error = %rollback, "Failed to discard untagged store transaction");
            }
            return Err(e.into());
        }

        inner.bound = Some(tx);
        tracing::debug!(%xid, %tx, "Began store transaction");
        Ok(())
    }

    /// Store transaction to finish: the recorded one, provided the store
    /// is not bound to a different transaction for this context
    fn check_identity(
        &self,
        store: &L::Store,
        recorded: Option<TxId<L>>,
    ) -> Result<Option<TxId<L>>> {
        match store.current_transaction(self.context) {
            Some(current) if Some(current) != recorded => Err(Error::TransactionMismatch {
                recorded: recorded.map_or_else(|| "none".to_string(), |tx| tx.to_string()),
                current: current.to_string(),
            }),
            _ => Ok(recorded),
        }
    }

    fn do_commit(&self, xid: &Xid, one_phase: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let recorded = inner.bound.take();
        tracing::debug!(%xid, one_phase, "commit");

        if !one_phase {
            tracing::warn!(%xid, "Two-phase commit is not supported by a last resource, committing in one phase");
            inner.warnings.push(AdapterWarning::TwoPhaseCommitRequested(xid.clone()));
        }

        let store = self.resolve(&mut inner)?;
        let tx = self.check_identity(&store, recorded)?.ok_or(Error::NotStarted)?;
        store.commit(self.context, tx)?;

        tracing::debug!(%xid, %tx, "Committed store transaction");
        Ok(())
    }

    fn do_rollback(&self, xid: &Xid) -> Result<()> {
        let mut inner = self.inner.lock();
        let recorded = inner.bound.take();
        tracing::debug!(%xid, "rollback");

        let store = self.resolve(&mut inner)?;
        let Some(tx) = self.check_identity(&store, recorded)? else {
            tracing::debug!(%xid, "No store transaction to roll back");
            return Ok(());
        };

        match store.rollback(self.context, tx) {
            Ok(()) => {
                tracing::debug!(%xid, %tx, "Rolled back store transaction");
                Ok(())
            }
            Err(e) if e.kind() == StoreErrorKind::NoActiveTransaction => {
                tracing::debug!(%xid, %tx, "Store transaction already finished");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn unsupported(operation: &'static str, xid: &Xid) -> XaError {
        tracing::warn!(%xid, operation, "Unsupported call on last resource");
        Error::ProtocolViolation {
            operation,
            xid: xid.clone(),
        }
        .into()
    }
}

impl<L: StoreLocator> XaResource for EnlistmentAdapter<L> {
    fn start(&self, xid: &Xid, flags: Flags) -> XaResult<()> {
        Ok(self.do_start(xid, flags)?)
    }

    fn end(&self, xid: &Xid, _flags: Flags) -> XaResult<()> {
        Err(Self::unsupported("end", xid))
    }

    fn prepare(&self, xid: &Xid) -> XaResult<Vote> {
        Err(Self::unsupported("prepare", xid))
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()> {
        Ok(self.do_commit(xid, one_phase)?)
    }

    fn rollback(&self, xid: &Xid) -> XaResult<()> {
        Ok(self.do_rollback(xid)?)
    }

    fn forget(&self, xid: &Xid) -> XaResult<()> {
        Err(Self::unsupported("forget", xid))
    }

    fn recover(&self, _flags: Flags) -> XaResult<Vec<Xid>> {
        Ok(Vec::new())
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool> {
        Ok(other.as_any().is::<Self>())
    }

    fn transaction_timeout(&self) -> XaResult<u32> {
        Ok(0)
    }

    fn set_transaction_timeout(&self, _seconds: u32) -> XaResult<bool> {
        Ok(false)
    }

    fn is_last_resource(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
