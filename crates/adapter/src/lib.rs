//! Last resource commit optimisation for the data grid
//!
//! Lets a store with only local transactions take part in a two-phase
//! commit as the coordinator's single last resource:
//!
//! - [`EnlistmentAdapter`]: the single-phase resource the coordinator drives
//! - [`enlist`]: registers a fresh adapter on the context's transaction
//! - [`TransactionalInterceptor`]: runs a unit of work inside a transaction
//! - [`TargetStore`] / [`StoreLocator`]: what the adapter needs from a store,
//!   implemented for [`lrco_grid::Cache`] and [`lrco_grid::CacheRegistry`]

mod config;
mod enlist;
mod error;
mod grid;
mod interceptor;
mod resource;
mod store;

pub use config::LrcoConfig;
pub use enlist::enlist;
pub use error::{EnlistError, Error, InterceptorError, Result};
pub use interceptor::TransactionalInterceptor;
pub use resource::{AdapterWarning, EnlistmentAdapter, ResourceState};
pub use store::{StoreError, StoreErrorKind, StoreLocator, TargetStore};
