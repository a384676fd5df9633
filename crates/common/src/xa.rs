//! X/Open resource contract
//!
//! The coordinator drives enlisted resources exclusively through the
//! `XaResource` trait. Error codes and flag values follow the X/Open XA
//! standard so that resources written against other coordinators map
//! one to one.

use crate::Xid;
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Result type for resource callbacks
pub type XaResult<T> = std::result::Result<T, XaError>;

/// Flags passed to `start`, `end` and `recover`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flags(i32);

impl Flags {
    pub const TMNOFLAGS: Flags = Flags(0x0000_0000);
    pub const TMJOIN: Flags = Flags(0x0020_0000);
    pub const TMENDRSCAN: Flags = Flags(0x0080_0000);
    pub const TMSTARTRSCAN: Flags = Flags(0x0100_0000);
    pub const TMSUSPEND: Flags = Flags(0x0200_0000);
    pub const TMSUCCESS: Flags = Flags(0x0400_0000);
    pub const TMRESUME: Flags = Flags(0x0800_0000);
    pub const TMFAIL: Flags = Flags(0x2000_0000);
    pub const TMONEPHASE: Flags = Flags(0x4000_0000);

    pub const fn bits(&self) -> i32 {
        self.0
    }

    pub const fn contains(&self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Outcome of a successful `prepare`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// XA_OK: the branch is prepared and must be committed or rolled back
    Commit,
    /// XA_RDONLY: the branch did no work and has already been released
    ReadOnly,
}

/// X/Open error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XaErrorCode {
    RbRollback,
    RbCommFail,
    RbDeadlock,
    RbIntegrity,
    RbOther,
    RbProto,
    RbTimeout,
    HeurHazard,
    HeurCommit,
    HeurRollback,
    HeurMixed,
    Async,
    RmError,
    NotA,
    Invalid,
    Protocol,
    RmFail,
    DuplicateId,
    Outside,
}

impl XaErrorCode {
    /// Numeric code as defined by the XA standard
    pub fn code(&self) -> i32 {
        match self {
            XaErrorCode::RbRollback => 100,
            XaErrorCode::RbCommFail => 101,
            XaErrorCode::RbDeadlock => 102,
            XaErrorCode::RbIntegrity => 103,
            XaErrorCode::RbOther => 104,
            XaErrorCode::RbProto => 105,
            XaErrorCode::RbTimeout => 106,
            XaErrorCode::HeurHazard => 8,
            XaErrorCode::HeurCommit => 7,
            XaErrorCode::HeurRollback => 6,
            XaErrorCode::HeurMixed => 5,
            XaErrorCode::Async => -2,
            XaErrorCode::RmError => -3,
            XaErrorCode::NotA => -4,
            XaErrorCode::Invalid => -5,
            XaErrorCode::Protocol => -6,
            XaErrorCode::RmFail => -7,
            XaErrorCode::DuplicateId => -8,
            XaErrorCode::Outside => -9,
        }
    }

    /// Whether the branch is known to have been rolled back
    pub fn is_rollback(&self) -> bool {
        (100..=106).contains(&self.code())
    }

    fn name(&self) -> &'static str {
        match self {
            XaErrorCode::RbRollback => "XA_RBROLLBACK",
            XaErrorCode::RbCommFail => "XA_RBCOMMFAIL",
            XaErrorCode::RbDeadlock => "XA_RBDEADLOCK",
            XaErrorCode::RbIntegrity => "XA_RBINTEGRITY",
            XaErrorCode::RbOther => "XA_RBOTHER",
            XaErrorCode::RbProto => "XA_RBPROTO",
            XaErrorCode::RbTimeout => "XA_RBTIMEOUT",
            XaErrorCode::HeurHazard => "XA_HEURHAZ",
            XaErrorCode::HeurCommit => "XA_HEURCOM",
            XaErrorCode::HeurRollback => "XA_HEURRB",
            XaErrorCode::HeurMixed => "XA_HEURMIX",
            XaErrorCode::Async => "XAER_ASYNC",
            XaErrorCode::RmError => "XAER_RMERR",
            XaErrorCode::NotA => "XAER_NOTA",
            XaErrorCode::Invalid => "XAER_INVAL",
            XaErrorCode::Protocol => "XAER_PROTO",
            XaErrorCode::RmFail => "XAER_RMFAIL",
            XaErrorCode::DuplicateId => "XAER_DUPID",
            XaErrorCode::Outside => "XAER_OUTSIDE",
        }
    }
}

impl fmt::Display for XaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error raised by a resource callback
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct XaError {
    code: XaErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl XaError {
    pub fn new(code: XaErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(XaErrorCode::Protocol, message)
    }

    pub fn rm_error(message: impl Into<String>) -> Self {
        Self::new(XaErrorCode::RmError, message)
    }

    pub fn rm_fail(message: impl Into<String>) -> Self {
        Self::new(XaErrorCode::RmFail, message)
    }

    pub fn code(&self) -> XaErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A resource manager the coordinator can enlist in a transaction.
///
/// All callbacks are synchronous and are invoked from the context that owns
/// the transaction.
pub trait XaResource: Send + Sync + 'static {
    /// Associate the resource with the transaction branch `xid`
    fn start(&self, xid: &Xid, flags: Flags) -> XaResult<()>;

    /// Disassociate the resource from `xid`
    fn end(&self, xid: &Xid, flags: Flags) -> XaResult<()>;

    /// Phase one of two-phase commit
    fn prepare(&self, xid: &Xid) -> XaResult<Vote>;

    /// Commit the branch; `one_phase` asks for a single-phase commit
    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()>;

    fn rollback(&self, xid: &Xid) -> XaResult<()>;

    /// Discard knowledge of a heuristically completed branch
    fn forget(&self, xid: &Xid) -> XaResult<()>;

    /// In-doubt branches known to this resource manager
    fn recover(&self, flags: Flags) -> XaResult<Vec<Xid>>;

    /// Whether `other` is backed by the same resource manager
    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool>;

    fn transaction_timeout(&self) -> XaResult<u32>;

    /// Returns `false` when the resource does not support timeouts
    fn set_transaction_timeout(&self, seconds: u32) -> XaResult<bool>;

    /// Marks a single-phase resource that must be committed last, after
    /// every two-phase participant has prepared. Such resources never
    /// receive `end` or `prepare`.
    fn is_last_resource(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}
