//! In-memory transaction coordinator
//!
//! This crate provides a coordinator that drives X/Open resources through
//! two-phase commit, with support for a single last resource: a
//! single-phase participant committed after every two-phase participant has
//! prepared. There is no transaction log and no recovery; it exists to
//! exercise resources against the coordinator contract.

mod config;
mod coordinator;
mod error;
mod transaction;

pub use config::{CoordinatorConfig, DEFAULT_FORMAT_ID};
pub use coordinator::TransactionManager;
pub use error::{CoordinatorError, Result};
pub use transaction::Transaction;
