//! Coordinator transaction
//!
//! The Transaction owns its enlisted resources and synchronizations and
//! drives them through completion. At most one resource (unless configured
//! otherwise) may be a last resource: it never sees `end` or `prepare` and is
//! committed single-phase after every two-phase resource has prepared.

use crate::error::{CoordinatorError, Result};
use lrco_common::{ContextId, Flags, Status, Synchronization, Vote, XaError, XaResource, Xid};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A resource enlisted on its own branch
#[derive(Clone)]
struct Enlisted {
    resource: Arc<dyn XaResource>,
    branch: Xid,
    last: bool,
}

struct State {
    status: Status,
    resources: Vec<Enlisted>,
    synchronizations: Vec<Arc<dyn Synchronization>>,
    next_branch: u32,
    /// Last resources enlisted or being started
    last_resources: usize,
}

struct Inner {
    xid: Xid,
    context: ContextId,
    deadline: Option<Instant>,
    allow_multiple_last_resources: bool,
    state: Mutex<State>,
}

/// Handle to a coordinator transaction
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

impl Transaction {
    pub(crate) fn new(
        xid: Xid,
        context: ContextId,
        timeout: Option<Duration>,
        allow_multiple_last_resources: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                xid,
                context,
                deadline: timeout.map(|t| Instant::now() + t),
                allow_multiple_last_resources,
                state: Mutex::new(State {
                    status: Status::Active,
                    resources: Vec::new(),
                    synchronizations: Vec::new(),
                    next_branch: 0,
                    last_resources: 0,
                }),
            }),
        }
    }

    /// Global transaction id
    pub fn xid(&self) -> &Xid {
        &self.inner.xid
    }

    /// Context this transaction is associated with
    pub fn context(&self) -> ContextId {
        self.inner.context
    }

    pub fn status(&self) -> Status {
        self.inner.state.lock().status
    }

    /// Number of enlisted branches (last resources included)
    pub fn resource_count(&self) -> usize {
        self.inner.state.lock().resources.len()
    }

    pub fn last_resource_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .resources
            .iter()
            .filter(|e| e.last)
            .count()
    }

    /// Descriptions of the registered synchronizations
    pub fn synchronizations(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .synchronizations
            .iter()
            .map(|s| s.describe())
            .collect()
    }

    /// Mark the transaction so that the only possible outcome is rollback
    pub fn set_rollback_only(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match state.status {
            Status::Active | Status::MarkedRollback => {
                state.status = Status::MarkedRollback;
                Ok(())
            }
            other => Err(CoordinatorError::InvalidState(other)),
        }
    }

    /// Enlist a resource in this transaction.
    ///
    /// Returns `Ok(false)` when the resource is a second last resource and
    /// multiple last resources are not allowed. Otherwise the resource is
    /// started on a branch of this transaction before being recorded.
    pub fn enlist_resource(&self, resource: Arc<dyn XaResource>) -> Result<bool> {
        if resource.is_last_resource() {
            if !self.reserve_last_resource()? {
                tracing::warn!(
                    xid = %self.inner.xid,
                    "Rejecting last resource: transaction already has one and multiple last resources are disabled"
                );
                return Ok(false);
            }
            if let Err(e) = self.start_branch(resource, true) {
                self.inner.state.lock().last_resources -= 1;
                return Err(e);
            }
            return Ok(true);
        }

        let existing = {
            let state = self.inner.state.lock();
            if state.status != Status::Active {
                return Err(CoordinatorError::InvalidState(state.status));
            }
            state.resources.clone()
        };

        for enlisted in existing.iter().filter(|e| !e.last) {
            if enlisted.resource.is_same_rm(resource.as_ref())? {
                // Same resource manager: the existing branch covers this work
                resource.start(&enlisted.branch, Flags::TMJOIN)?;
                tracing::debug!(xid = %enlisted.branch, "Joined existing branch");
                return Ok(true);
            }
        }

        self.start_branch(resource, false)?;
        Ok(true)
    }

    /// Claim a last resource slot. The slot is held from here on, so a
    /// concurrent or re-entrant enlistment sees it before `start` returns.
    fn reserve_last_resource(&self) -> Result<bool> {
        let mut state = self.inner.state.lock();
        if state.status != Status::Active {
            return Err(CoordinatorError::InvalidState(state.status));
        }
        if !self.inner.allow_multiple_last_resources && state.last_resources > 0 {
            return Ok(false);
        }
        state.last_resources += 1;
        Ok(true)
    }

    fn start_branch(&self, resource: Arc<dyn XaResource>, last: bool) -> Result<()> {
        let branch = {
            let mut state = self.inner.state.lock();
            state.next_branch += 1;
            self.inner.xid.branch(state.next_branch)
        };

        resource.start(&branch, Flags::TMNOFLAGS)?;
        tracing::debug!(xid = %branch, last, "Enlisted resource");

        self.inner.state.lock().resources.push(Enlisted {
            resource,
            branch,
            last,
        });
        Ok(())
    }

    /// Register a synchronization to be told about completion
    pub fn register_synchronization(&self, synchronization: Box<dyn Synchronization>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.status != Status::Active {
            return Err(CoordinatorError::InvalidState(state.status));
        }
        tracing::debug!(
            xid = %self.inner.xid,
            synchronization = %synchronization.describe(),
            "Registered synchronization"
        );
        state.synchronizations.push(Arc::from(synchronization));
        Ok(())
    }

    /// Commit the transaction
    pub fn commit(&self) -> Result<()> {
        match self.status() {
            Status::Active => {}
            Status::MarkedRollback => {
                return self.rollback_with_reason("transaction was marked rollback-only");
            }
            other => return Err(CoordinatorError::InvalidState(other)),
        }

        if self.is_expired() {
            return self.rollback_with_reason("transaction timed out");
        }

        if let Err(reason) = self.before_completion() {
            return self.rollback_with_reason(&format!("before_completion failed: {}", reason));
        }

        let resources = {
            let mut state = self.inner.state.lock();
            if state.status == Status::MarkedRollback {
                drop(state);
                return self.rollback_with_reason("marked rollback-only during before_completion");
            }
            state.status = Status::Preparing;
            state.resources.clone()
        };

        let (last, two_phase): (Vec<Enlisted>, Vec<Enlisted>) =
            resources.into_iter().partition(|e| e.last);

        if last.is_empty() && two_phase.len() == 1 {
            return self.commit_one_phase(&two_phase[0]);
        }

        // Phase 1: prepare every two-phase resource
        let mut prepared = Vec::new();
        for (i, enlisted) in two_phase.iter().enumerate() {
            let vote = enlisted
                .resource
                .end(&enlisted.branch, Flags::TMSUCCESS)
                .and_then(|_| enlisted.resource.prepare(&enlisted.branch));

            match vote {
                Ok(Vote::Commit) => prepared.push(enlisted.clone()),
                Ok(Vote::ReadOnly) => {
                    tracing::debug!(xid = %enlisted.branch, "Read-only vote, branch released");
                }
                Err(e) => {
                    tracing::warn!(xid = %enlisted.branch, "Prepare failed: {}", e);
                    for p in &prepared {
                        Self::rollback_branch(p, false);
                    }
                    if !e.code().is_rollback() {
                        Self::rollback_branch(enlisted, false);
                    }
                    for rest in &two_phase[i + 1..] {
                        Self::rollback_branch(rest, true);
                    }
                    for lr in &last {
                        Self::rollback_branch(lr, false);
                    }
                    self.complete(Status::RolledBack);
                    return Err(CoordinatorError::RolledBack(format!(
                        "prepare failed on {}: {}",
                        enlisted.branch, e
                    )));
                }
            }
        }

        self.set_status(Status::Prepared);
        self.set_status(Status::Committing);

        // Last resources decide the outcome
        let mut heuristics = Vec::new();
        for (i, lr) in last.iter().enumerate() {
            if let Err(e) = lr.resource.commit(&lr.branch, true) {
                if i == 0 {
                    tracing::error!(xid = %lr.branch, "Last resource commit failed: {}", e);
                    for rest in &last[1..] {
                        Self::rollback_branch(rest, false);
                    }
                    for p in &prepared {
                        Self::rollback_branch(p, false);
                    }
                    self.complete(Status::RolledBack);
                    return Err(CoordinatorError::RolledBack(format!(
                        "last resource commit failed: {}",
                        e
                    )));
                }
                tracing::error!(
                    xid = %lr.branch,
                    "Additional last resource failed after the first committed: {}",
                    e
                );
                heuristics.push(format!("{}: {}", lr.branch, e));
            }
        }

        // Phase 2: commit the prepared resources
        for p in &prepared {
            if let Err(e) = p.resource.commit(&p.branch, false) {
                tracing::error!(xid = %p.branch, "Commit of prepared branch failed: {}", e);
                heuristics.push(format!("{}: {}", p.branch, e));
            }
        }

        self.complete(Status::Committed);

        if heuristics.is_empty() {
            Ok(())
        } else {
            Err(CoordinatorError::HeuristicMixed(heuristics.join("; ")))
        }
    }

    fn commit_one_phase(&self, only: &Enlisted) -> Result<()> {
        self.set_status(Status::Committing);

        let result = only
            .resource
            .end(&only.branch, Flags::TMSUCCESS)
            .and_then(|_| only.resource.commit(&only.branch, true));

        match result {
            Ok(()) => {
                self.complete(Status::Committed);
                Ok(())
            }
            Err(e) => {
                self.complete(Status::RolledBack);
                Err(CoordinatorError::RolledBack(format!(
                    "one-phase commit failed: {}",
                    e
                )))
            }
        }
    }

    /// Roll the transaction back
    pub fn rollback(&self) -> Result<()> {
        let resources = {
            let mut state = self.inner.state.lock();
            match state.status {
                Status::Active | Status::MarkedRollback => {}
                other => return Err(CoordinatorError::InvalidState(other)),
            }
            state.status = Status::RollingBack;
            state.resources.clone()
        };

        let mut first_error: Option<XaError> = None;
        for enlisted in &resources {
            if let Some(e) = Self::rollback_branch(enlisted, !enlisted.last) {
                first_error.get_or_insert(e);
            }
        }

        self.complete(Status::RolledBack);

        match first_error {
            Some(e) => Err(CoordinatorError::Resource(e)),
            None => Ok(()),
        }
    }

    fn rollback_with_reason(&self, reason: &str) -> Result<()> {
        if let Err(e) = self.rollback() {
            tracing::warn!(xid = %self.inner.xid, "Rollback reported an error: {}", e);
        }
        Err(CoordinatorError::RolledBack(reason.to_string()))
    }

    fn rollback_branch(enlisted: &Enlisted, end_first: bool) -> Option<XaError> {
        if end_first && let Err(e) = enlisted.resource.end(&enlisted.branch, Flags::TMFAIL) {
            tracing::debug!(xid = %enlisted.branch, "end(TMFAIL) failed: {}", e);
        }

        match enlisted.resource.rollback(&enlisted.branch) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(xid = %enlisted.branch, "Rollback failed: {}", e);
                Some(e)
            }
        }
    }

    fn before_completion(&self) -> std::result::Result<(), String> {
        let synchronizations = self.inner.state.lock().synchronizations.clone();
        for sync in &synchronizations {
            sync.before_completion()?;
        }
        Ok(())
    }

    fn complete(&self, status: Status) {
        let synchronizations = {
            let mut state = self.inner.state.lock();
            state.status = status;
            state.synchronizations.clone()
        };

        for sync in &synchronizations {
            sync.after_completion(status);
        }
        tracing::debug!(xid = %self.inner.xid, ?status, "Transaction completed");
    }

    fn set_status(&self, status: Status) {
        self.inner.state.lock().status = status;
    }

    fn is_expired(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() > deadline)
    }
}
