//! In-memory data grid with local transactions
//!
//! A [`Cache`] holds named [`Region`]s. Each execution context may run one
//! local transaction at a time through the cache's [`GridTxManager`].
//! When a context writes a region without a local transaction while a
//! coordinator transaction is active for it, the cache starts one and
//! registers a synchronization so that the coordinator's outcome is
//! applied. Transactions marked as externally coordinated are left to
//! whoever marked them.

mod cache;
mod config;
mod error;
mod region;
mod storage;
mod synchronization;
mod transaction;
mod value;

pub use cache::{Cache, CacheRegistry};
pub use config::GridConfig;
pub use error::{GridError, Result};
pub use region::Region;
pub use transaction::{GridTxId, GridTxManager};
pub use value::Value;
