//! Transaction manager
//!
//! Associates at most one transaction with each execution context and
//! exposes that association to stores through `TransactionRegistry`.

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::transaction::Transaction;
use lrco_common::{ContextId, RegistryError, Status, Synchronization, TransactionRegistry, Xid};
use parking_lot::Mutex;
use std::collections::HashMap;

/// In-memory transaction manager
pub struct TransactionManager {
    config: CoordinatorConfig,

    /// Context -> associated transaction
    transactions: Mutex<HashMap<ContextId, Transaction>>,
}

impl TransactionManager {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Begin a transaction and associate it with `context`
    pub fn begin(&self, context: ContextId) -> Result<Transaction> {
        let mut transactions = self.transactions.lock();
        if transactions.contains_key(&context) {
            return Err(CoordinatorError::NotSupported(context));
        }

        let tx = Transaction::new(
            Xid::generate(self.config.format_id),
            context,
            self.config.timeout(),
            self.config.allow_multiple_last_resources,
        );
        tracing::debug!(xid = %tx.xid(), %context, "Began transaction");

        transactions.insert(context, tx.clone());
        Ok(tx)
    }

    /// Transaction associated with `context`, if any
    pub fn transaction(&self, context: ContextId) -> Option<Transaction> {
        self.transactions.lock().get(&context).cloned()
    }

    pub fn status(&self, context: ContextId) -> Status {
        self.transaction(context)
            .map(|tx| tx.status())
            .unwrap_or(Status::NoTransaction)
    }

    /// Commit the transaction of `context` and end the association
    pub fn commit(&self, context: ContextId) -> Result<()> {
        self.disassociate(context)?.commit()
    }

    /// Roll back the transaction of `context` and end the association
    pub fn rollback(&self, context: ContextId) -> Result<()> {
        self.disassociate(context)?.rollback()
    }

    pub fn set_rollback_only(&self, context: ContextId) -> Result<()> {
        self.transaction(context)
            .ok_or(CoordinatorError::NoTransaction(context))?
            .set_rollback_only()
    }

    /// Number of contexts with an associated transaction
    pub fn active_count(&self) -> usize {
        self.transactions.lock().len()
    }

    fn disassociate(&self, context: ContextId) -> Result<Transaction> {
        self.transactions
            .lock()
            .remove(&context)
            .ok_or(CoordinatorError::NoTransaction(context))
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl TransactionRegistry for TransactionManager {
    fn active_transaction(&self, context: ContextId) -> Option<Xid> {
        self.transaction(context)
            .filter(|tx| !tx.status().is_terminal())
            .map(|tx| tx.xid().clone())
    }

    fn register_synchronization(
        &self,
        context: ContextId,
        synchronization: Box<dyn Synchronization>,
    ) -> std::result::Result<(), RegistryError> {
        let tx = self
            .transaction(context)
            .ok_or(RegistryError::NoTransaction(context))?;

        tx.register_synchronization(synchronization)
            .map_err(|_| RegistryError::NotActive(tx.status()))
    }
}
