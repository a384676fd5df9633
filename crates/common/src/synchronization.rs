//! Transaction status, completion callbacks and the registry a store binds to

use crate::{ContextId, Xid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coordinator transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Active,
    MarkedRollback,
    Preparing,
    Prepared,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
    NoTransaction,
}

impl Status {
    /// Committed or rolled back
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Committed | Status::RolledBack)
    }
}

/// Callbacks a participant can register to learn the transaction outcome
/// without being a resource
pub trait Synchronization: Send + Sync {
    /// Runs before the two-phase commit starts. An error forces rollback.
    fn before_completion(&self) -> Result<(), String>;

    /// Runs once the outcome is final
    fn after_completion(&self, status: Status);

    /// Human readable description, used in diagnostics
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Errors from the transaction registry
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No transaction associated with {0}")]
    NoTransaction(ContextId),

    #[error("Transaction is not active: {0:?}")]
    NotActive(Status),
}

/// What a store sees of the coordinator: the transaction associated with a
/// context, and the ability to register synchronizations on it.
pub trait TransactionRegistry: Send + Sync {
    /// Xid of the active transaction associated with `context`
    fn active_transaction(&self, context: ContextId) -> Option<Xid>;

    fn register_synchronization(
        &self,
        context: ContextId,
        synchronization: Box<dyn Synchronization>,
    ) -> Result<(), RegistryError>;
}
