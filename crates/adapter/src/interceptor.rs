//! Transaction boundaries around a unit of work
//!
//! [`TransactionalInterceptor::run`] begins a coordinator transaction for
//! the context unless one is already associated, enlists the store when the
//! last-resource optimisation is enabled, and commits or rolls back on the
//! work's result.

use crate::config::LrcoConfig;
use crate::enlist::enlist;
use crate::error::InterceptorError;
use crate::store::StoreLocator;
use lrco_common::ContextId;
use lrco_coordinator::{Transaction, TransactionManager};
use std::sync::Arc;

pub struct TransactionalInterceptor<L: StoreLocator> {
    tm: Arc<TransactionManager>,
    locator: Arc<L>,
    config: LrcoConfig,
}

impl<L: StoreLocator> TransactionalInterceptor<L> {
    pub fn new(tm: Arc<TransactionManager>, locator: Arc<L>, config: LrcoConfig) -> Self {
        if !config.one_phase_commit {
            tracing::warn!(
                "Last resource commit optimisation is disabled; the store will join transactions through its own synchronization"
            );
        }
        Self { tm, locator, config }
    }

    pub fn config(&self) -> &LrcoConfig {
        &self.config
    }

    pub fn transaction_manager(&self) -> &Arc<TransactionManager> {
        &self.tm
    }

    /// Run `work` inside a transaction of `context`.
    ///
    /// If the context already has a transaction, `work` joins it: nothing is
    /// enlisted, and an error only marks the transaction rollback-only.
    pub fn run<T, E, F>(&self, context: ContextId, work: F) -> Result<T, InterceptorError<E>>
    where
        F: FnOnce(&Transaction) -> Result<T, E>,
    {
        if let Some(tx) = self.tm.transaction(context) {
            tracing::debug!(xid = %tx.xid(), %context, "Joining existing transaction");
            return work(&tx).map_err(|e| {
                if let Err(mark) = tx.set_rollback_only() {
                    tracing::warn!(xid = %tx.xid(), error = %mark, "Could not mark transaction rollback-only");
                }
                InterceptorError::Work(e)
            });
        }

        let tx = self.tm.begin(context)?;

        if self.config.one_phase_commit {
            tracing::debug!(xid = %tx.xid(), %context, "Enlisting store as last resource");
            if let Err(e) = enlist(&self.tm, context, self.locator.clone()) {
                self.rollback_quietly(context);
                return Err(InterceptorError::Enlist(e));
            }
        } else {
            tracing::debug!(
                xid = %tx.xid(),
                %context,
                "Last resource optimisation disabled, store joins through its synchronization"
            );
        }

        match work(&tx) {
            Ok(value) => {
                self.tm.commit(context)?;
                Ok(value)
            }
            Err(e) => {
                self.rollback_quietly(context);
                Err(InterceptorError::Work(e))
            }
        }
    }

    fn rollback_quietly(&self, context: ContextId) {
        if let Err(e) = self.tm.rollback(context) {
            tracing::warn!(%context, error = %e, "Rollback reported an error");
        }
    }
}
