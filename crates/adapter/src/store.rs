//! What the adapter needs from the store it drives

use lrco_common::ContextId;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;
use thiserror::Error;

/// Classification of store failures the adapter reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The context has no store transaction; tolerated on rollback
    NoActiveTransaction,
    /// The context already has a store transaction
    AlreadyActive,
    /// The context's transaction is not the one named
    Mismatch,
    /// Commit refused because data changed underneath the transaction
    Conflict,
    /// The store is closed or cannot be found
    Unavailable,
    Other,
}

impl Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreErrorKind::NoActiveTransaction => "no active transaction",
            StoreErrorKind::AlreadyActive => "already active",
            StoreErrorKind::Mismatch => "transaction mismatch",
            StoreErrorKind::Conflict => "conflict",
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`TargetStore`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Store error ({kind}): {message}")]
pub struct StoreError {
    kind: StoreErrorKind,
    message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn no_active_transaction(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NoActiveTransaction, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Transactional store with one current transaction per context
pub trait TargetStore: Send + Sync + 'static {
    type TransactionId: Copy + Eq + Debug + Display + Send + Sync + 'static;

    fn is_closed(&self) -> bool;

    /// Whether a coordinator transaction is active for `context`
    fn has_coordinator_transaction(&self, context: ContextId) -> bool;

    fn current_transaction(&self, context: ContextId) -> Option<Self::TransactionId>;

    fn begin(&self, context: ContextId) -> Result<Self::TransactionId, StoreError>;

    /// Tag `tx` as driven by a foreign coordinator so the store does not
    /// enlist itself a second time
    fn mark_externally_coordinated(
        &self,
        context: ContextId,
        tx: Self::TransactionId,
    ) -> Result<(), StoreError>;

    fn commit(&self, context: ContextId, tx: Self::TransactionId) -> Result<(), StoreError>;

    fn rollback(&self, context: ContextId, tx: Self::TransactionId) -> Result<(), StoreError>;
}

/// Resolves the store an adapter drives
pub trait StoreLocator: Send + Sync + 'static {
    type Store: TargetStore;

    fn locate(&self) -> Result<Arc<Self::Store>, StoreError>;
}
