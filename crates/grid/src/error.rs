//! Error types for the grid

use crate::transaction::GridTxId;
use lrco_common::ContextId;
use thiserror::Error;

/// Result type for grid operations
pub type Result<T> = std::result::Result<T, GridError>;

/// Grid errors. Callers match on the variant, never on the message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("{0} does not have an active transaction")]
    NoActiveTransaction(ContextId),

    #[error("{context} is already associated with transaction {current}")]
    AlreadyActive {
        context: ContextId,
        current: GridTxId,
    },

    #[error("{context} is associated with {current}, not {requested}")]
    TransactionMismatch {
        context: ContextId,
        requested: GridTxId,
        current: GridTxId,
    },

    #[error("Commit conflict on {region}/{key}: entry changed since it was first written")]
    CommitConflict { region: String, key: String },

    #[error("Cache {0} is closed")]
    CacheClosed(String),

    #[error("No open cache is available")]
    NoCacheAvailable,

    #[error("Failed to register with the coordinator transaction: {0}")]
    Synchronization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
