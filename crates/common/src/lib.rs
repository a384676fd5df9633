//! Common types shared by the coordinator, the grid and the adapter
//!
//! This crate defines:
//! - Global transaction identifiers (`Xid`)
//! - Explicit execution contexts replacing thread-bound lookups
//! - The X/Open resource contract (`XaResource`, flags, error codes)
//! - Completion callbacks and the registry a store binds to

mod context;
mod synchronization;
mod xa;
mod xid;

pub use context::ContextId;
pub use synchronization::{RegistryError, Status, Synchronization, TransactionRegistry};
pub use xa::{Flags, Vote, XaError, XaErrorCode, XaResource, XaResult};
pub use xid::{MAXBQUALSIZE, MAXGTRIDSIZE, Xid};
