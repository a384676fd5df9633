//! Binding of the data grid to the adapter's store seam

use crate::store::{StoreError, StoreErrorKind, StoreLocator, TargetStore};
use lrco_common::ContextId;
use lrco_grid::{Cache, CacheRegistry, GridError, GridTxId};
use std::sync::Arc;

impl From<GridError> for StoreError {
    fn from(err: GridError) -> Self {
        let kind = match &err {
            GridError::NoActiveTransaction(_) => StoreErrorKind::NoActiveTransaction,
            GridError::AlreadyActive { .. } => StoreErrorKind::AlreadyActive,
            GridError::TransactionMismatch { .. } => StoreErrorKind::Mismatch,
            GridError::CommitConflict { .. } => StoreErrorKind::Conflict,
            GridError::CacheClosed(_) | GridError::NoCacheAvailable => StoreErrorKind::Unavailable,
            GridError::Synchronization(_) | GridError::Config(_) => StoreErrorKind::Other,
        };
        StoreError::new(kind, err.to_string())
    }
}

impl TargetStore for Cache {
    type TransactionId = GridTxId;

    fn is_closed(&self) -> bool {
        Cache::is_closed(self)
    }

    fn has_coordinator_transaction(&self, context: ContextId) -> bool {
        Cache::has_coordinator_transaction(self, context)
    }

    fn current_transaction(&self, context: ContextId) -> Option<GridTxId> {
        self.tx_manager().current(context)
    }

    fn begin(&self, context: ContextId) -> Result<GridTxId, StoreError> {
        Ok(self.tx_manager().begin(context)?)
    }

    fn mark_externally_coordinated(&self, context: ContextId, tx: GridTxId) -> Result<(), StoreError> {
        Ok(self.tx_manager().mark_externally_coordinated(context, tx)?)
    }

    fn commit(&self, context: ContextId, tx: GridTxId) -> Result<(), StoreError> {
        Ok(self.tx_manager().commit(context, tx)?)
    }

    fn rollback(&self, context: ContextId, tx: GridTxId) -> Result<(), StoreError> {
        Ok(self.tx_manager().rollback(context, tx)?)
    }
}

/// Any open cache of the registry
impl StoreLocator for CacheRegistry {
    type Store = Cache;

    fn locate(&self) -> Result<Arc<Cache>, StoreError> {
        Ok(Arc::new(self.any_instance()?))
    }
}

/// A fixed cache
impl StoreLocator for Cache {
    type Store = Cache;

    fn locate(&self) -> Result<Arc<Cache>, StoreError> {
        if Cache::is_closed(self) {
            return Err(StoreError::unavailable(format!("Cache {} is closed", self.name())));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lrco_grid::GridConfig;

    #[test]
    fn test_grid_errors_keep_their_kind() {
        let ctx = ContextId::next();
        let cases = [
            (GridError::NoActiveTransaction(ctx), StoreErrorKind::NoActiveTransaction),
            (
                GridError::AlreadyActive {
                    context: ctx,
                    current: GridTxId::new(),
                },
                StoreErrorKind::AlreadyActive,
            ),
            (GridError::CacheClosed("grid".into()), StoreErrorKind::Unavailable),
            (GridError::NoCacheAvailable, StoreErrorKind::Unavailable),
            (
                GridError::CommitConflict {
                    region: "r".into(),
                    key: "k".into(),
                },
                StoreErrorKind::Conflict,
            ),
        ];

        for (err, kind) in cases {
            assert_eq!(StoreError::from(err).kind(), kind);
        }
    }

    #[test]
    fn test_registry_locates_newest_open_cache() {
        let registry = CacheRegistry::new();
        assert_eq!(
            registry.locate().err().map(|e| e.kind()),
            Some(StoreErrorKind::Unavailable)
        );

        let cache = registry.create(GridConfig::new("accounts"));
        assert_eq!(registry.locate().unwrap().name(), "accounts");

        cache.close();
        assert!(cache.locate().is_err());
    }
}
