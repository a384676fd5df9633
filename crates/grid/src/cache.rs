//! Caches and the process-wide registry of them

use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::region::Region;
use crate::storage::RegionStore;
use crate::synchronization::GridSynchronization;
use crate::transaction::{GridTxId, GridTxManager, Regions};
use lrco_common::{ContextId, TransactionRegistry};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct CacheInner {
    config: GridConfig,
    closed: Arc<AtomicBool>,
    regions: Arc<Regions>,
    tx_manager: Arc<GridTxManager>,
    registry: RwLock<Option<Arc<dyn TransactionRegistry>>>,
}

/// An in-memory data grid instance. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    pub fn new(config: GridConfig) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let regions: Arc<Regions> = Arc::new(RwLock::new(HashMap::new()));
        let tx_manager = Arc::new(GridTxManager::new(
            config.name.clone(),
            closed.clone(),
            regions.clone(),
            config.conflict_detection,
        ));

        tracing::info!(cache = %config.name, "Created cache");
        Self {
            inner: Arc::new(CacheInner {
                config,
                closed,
                regions,
                tx_manager,
                registry: RwLock::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &GridConfig {
        &self.inner.config
    }

    /// Region `name`, created on first use
    pub fn region(&self, name: &str) -> Result<Region> {
        self.ensure_open()?;
        let store = {
            let mut regions = self.inner.regions.write();
            regions
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RegionStore::default()))
                .clone()
        };
        Ok(Region::new(name.to_string(), store, self.clone()))
    }

    /// Names of the existing regions, sorted
    pub fn region_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.regions.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close the cache. In-flight transactions are dropped.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            let dropped = self.inner.tx_manager.clear();
            tracing::info!(cache = %self.name(), dropped, "Closed cache");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Local transaction manager of this cache
    pub fn tx_manager(&self) -> &Arc<GridTxManager> {
        &self.inner.tx_manager
    }

    /// Bind the coordinator the cache consults when a region is written
    /// outside a local transaction
    pub fn bind_transaction_registry(&self, registry: Arc<dyn TransactionRegistry>) {
        *self.inner.registry.write() = Some(registry);
    }

    pub fn transaction_registry(&self) -> Option<Arc<dyn TransactionRegistry>> {
        self.inner.registry.read().clone()
    }

    /// Whether a coordinator transaction is active for `context`
    pub fn has_coordinator_transaction(&self, context: ContextId) -> bool {
        self.transaction_registry()
            .is_some_and(|registry| registry.active_transaction(context).is_some())
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(GridError::CacheClosed(self.name().to_string()));
        }
        Ok(())
    }

    /// Local transaction a region operation of `context` runs in.
    ///
    /// If none is bound but a coordinator transaction is active, a local
    /// transaction is started and tied to the coordinator's outcome through
    /// a [`GridSynchronization`].
    pub(crate) fn join_transaction(&self, context: ContextId) -> Result<Option<GridTxId>> {
        let tx_manager = &self.inner.tx_manager;
        if let Some(id) = tx_manager.current(context) {
            return Ok(Some(id));
        }

        let Some(registry) = self.transaction_registry() else {
            return Ok(None);
        };
        let Some(xid) = registry.active_transaction(context) else {
            return Ok(None);
        };

        let id = tx_manager.begin(context)?;
        let synchronization = GridSynchronization::new(tx_manager.clone(), context, id);
        if let Err(e) = registry.register_synchronization(context, Box::new(synchronization)) {
            tracing::warn!(%context, %xid, error = %e, "Could not join coordinator transaction");
            tx_manager.rollback(context, id)?;
            return Err(GridError::Synchronization(e.to_string()));
        }
        tx_manager.mark_synchronized(context, id)?;

        tracing::debug!(cache = %self.name(), %context, %xid, tx = %id, "Joined coordinator transaction");
        Ok(Some(id))
    }
}

/// Registry of the caches in this process
#[derive(Default)]
pub struct CacheRegistry {
    caches: Mutex<Vec<Cache>>,
    transaction_registry: Option<Arc<dyn TransactionRegistry>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches created through this registry are bound to `registry`
    pub fn with_transaction_registry(registry: Arc<dyn TransactionRegistry>) -> Self {
        Self {
            caches: Mutex::new(Vec::new()),
            transaction_registry: Some(registry),
        }
    }

    /// Create a cache, or return the open cache with the same name
    pub fn create(&self, config: GridConfig) -> Cache {
        let mut caches = self.caches.lock();
        if let Some(existing) = caches
            .iter()
            .find(|c| !c.is_closed() && c.name() == config.name)
        {
            return existing.clone();
        }

        let cache = Cache::new(config);
        if let Some(registry) = &self.transaction_registry {
            cache.bind_transaction_registry(registry.clone());
        }
        caches.retain(|c| !c.is_closed());
        caches.push(cache.clone());
        cache
    }

    /// Most recently created open cache
    pub fn any_instance(&self) -> Result<Cache> {
        self.caches
            .lock()
            .iter()
            .rev()
            .find(|c| !c.is_closed())
            .cloned()
            .ok_or(GridError::NoCacheAvailable)
    }

    /// Open cache named `name`
    pub fn get(&self, name: &str) -> Option<Cache> {
        self.caches
            .lock()
            .iter()
            .find(|c| !c.is_closed() && c.name() == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_returns_open_cache_with_same_name() {
        let registry = CacheRegistry::new();
        let first = registry.create(GridConfig::new("accounts"));
        let second = registry.create(GridConfig::new("accounts"));
        assert!(Arc::ptr_eq(&first.inner, &second.inner));

        first.close();
        let third = registry.create(GridConfig::new("accounts"));
        assert!(!Arc::ptr_eq(&first.inner, &third.inner));
    }

    #[test]
    fn test_any_instance_skips_closed_caches() {
        let registry = CacheRegistry::new();
        assert_eq!(
            registry.any_instance().err(),
            Some(GridError::NoCacheAvailable)
        );

        let a = registry.create(GridConfig::new("a"));
        let b = registry.create(GridConfig::new("b"));
        assert_eq!(registry.any_instance().unwrap().name(), "b");

        b.close();
        assert_eq!(registry.any_instance().unwrap().name(), "a");
        assert!(registry.get("b").is_none());

        a.close();
        assert!(registry.any_instance().is_err());
    }

    #[test]
    fn test_closed_cache_refuses_regions() {
        let cache = Cache::new(GridConfig::default());
        cache.region("accounts").unwrap();
        cache.close();

        assert_eq!(
            cache.region("accounts").err(),
            Some(GridError::CacheClosed("grid".to_string()))
        );
        assert_eq!(cache.region_names(), vec!["accounts".to_string()]);
    }

    #[test]
    fn test_close_drops_in_flight_transactions() {
        let cache = Cache::new(GridConfig::default());
        let region = cache.region("accounts").unwrap();
        let ctx = ContextId::next();
        let id = cache.tx_manager().begin(ctx).unwrap();
        region.put(ctx, "alice", 10).unwrap();
        assert_eq!(cache.tx_manager().active_count(), 1);

        cache.close();

        assert_eq!(cache.tx_manager().active_count(), 0);
        assert_eq!(cache.tx_manager().current(ctx), None);
        assert_eq!(
            cache.tx_manager().commit(ctx, id),
            Err(GridError::CacheClosed("grid".to_string()))
        );
        assert_eq!(
            cache.tx_manager().rollback(ctx, id),
            Err(GridError::NoActiveTransaction(ctx))
        );
        assert!(region.is_empty());
    }

    #[test]
    fn test_no_registry_means_no_transaction() {
        let cache = Cache::new(GridConfig::default());
        let ctx = ContextId::next();
        assert!(!cache.has_coordinator_transaction(ctx));
        assert_eq!(cache.join_transaction(ctx), Ok(None));
    }
}
