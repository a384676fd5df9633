//! Error types for the adapter

use crate::store::{StoreError, StoreErrorKind};
use lrco_common::{ContextId, XaError, XaErrorCode, Xid};
use lrco_coordinator::CoordinatorError;
use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter errors. Converted to [`XaError`] at the resource boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{operation} is not supported by a last resource (xid {xid})")]
    ProtocolViolation { operation: &'static str, xid: Xid },

    #[error("A transaction is already in progress")]
    AlreadyActive,

    #[error("The store is already associated with transaction {0}")]
    StoreAlreadyAssociated(String),

    #[error("Store transaction {current} is not the one this resource began ({recorded})")]
    TransactionMismatch { recorded: String, current: String },

    #[error("No store transaction was begun by this resource")]
    NotStarted,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Store is unavailable: {0}")]
    Unavailable(StoreError),
}

impl From<Error> for XaError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::ProtocolViolation { .. }
            | Error::AlreadyActive
            | Error::StoreAlreadyAssociated(_)
            | Error::TransactionMismatch { .. } => XaErrorCode::Protocol,
            Error::NotStarted => XaErrorCode::RmError,
            Error::Store(e) if e.kind() == StoreErrorKind::Unavailable => XaErrorCode::RmFail,
            Error::Store(_) => XaErrorCode::RmError,
            Error::Unavailable(_) => XaErrorCode::RmFail,
        };
        XaError::new(code, err.to_string()).with_source(err)
    }
}

/// Failure to enlist an adapter in the coordinator transaction
#[derive(Error, Debug)]
pub enum EnlistError {
    #[error("No active transaction for {0}")]
    NoTransaction(ContextId),

    #[error("Coordinator refused the last resource for {0}")]
    Rejected(Xid),

    #[error("Enlistment failed: {0}")]
    Coordinator(#[source] CoordinatorError),
}

/// Failure of a unit of work run through the interceptor
#[derive(Error, Debug)]
pub enum InterceptorError<E> {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Enlist(EnlistError),

    #[error("{0}")]
    Work(E),
}
