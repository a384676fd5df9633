//! Error types for the coordinator

use lrco_common::{ContextId, Status, XaError};
use thiserror::Error;

/// Coordinator error types
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Nested transactions are not supported: {0} already has a transaction")]
    NotSupported(ContextId),

    #[error("No transaction associated with {0}")]
    NoTransaction(ContextId),

    #[error("Invalid transaction state: {0:?}")]
    InvalidState(Status),

    #[error("Transaction rolled back: {0}")]
    RolledBack(String),

    #[error("Heuristic mixed outcome: {0}")]
    HeuristicMixed(String),

    #[error("Resource error: {0}")]
    Resource(#[from] XaError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;
