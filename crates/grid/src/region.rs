//! Named key/value regions

use crate::cache::Cache;
use crate::error::Result;
use crate::storage::RegionStore;
use crate::value::Value;
use lrco_common::ContextId;
use std::sync::Arc;

/// Handle to a region of a cache.
///
/// Writes made while `context` has a local transaction are buffered in it.
/// Without one, a write either joins the active coordinator transaction of
/// `context` or is applied immediately.
#[derive(Clone)]
pub struct Region {
    name: String,
    store: Arc<RegionStore>,
    cache: Cache,
}

impl Region {
    pub(crate) fn new(name: String, store: Arc<RegionStore>, cache: Cache) -> Self {
        Self { name, store, cache }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store `value` under `key`, returning the previous value
    pub fn put(
        &self,
        context: ContextId,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        self.write(context, key.into(), Some(value.into()))
    }

    /// Remove `key`, returning the removed value
    pub fn remove(&self, context: ContextId, key: impl Into<String>) -> Result<Option<Value>> {
        self.write(context, key.into(), None)
    }

    /// Value of `key` as seen by `context`, including its uncommitted writes
    pub fn get(&self, context: ContextId, key: &str) -> Result<Option<Value>> {
        self.cache.ensure_open()?;
        if let Some(pending) = self.cache.tx_manager().pending(context, &self.name, key) {
            return Ok(pending);
        }
        Ok(self.store.get(key))
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    fn write(&self, context: ContextId, key: String, value: Option<Value>) -> Result<Option<Value>> {
        self.cache.ensure_open()?;
        match self.cache.join_transaction(context)? {
            Some(_) => self
                .cache
                .tx_manager()
                .stage(context, &self.name, &self.store, key, value),
            None => {
                tracing::trace!(region = %self.name, %key, "Non-transactional write");
                Ok(self.store.write_direct(key, value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Cache, GridConfig, Value};
    use lrco_common::ContextId;

    #[test]
    fn test_direct_writes_are_visible_immediately() {
        let cache = Cache::new(GridConfig::default());
        let region = cache.region("accounts").unwrap();
        let ctx = ContextId::next();

        assert_eq!(region.put(ctx, "alice", 10).unwrap(), None);
        assert_eq!(
            region.get(ContextId::next(), "alice").unwrap(),
            Some(Value::Integer(10))
        );
        assert_eq!(region.remove(ctx, "alice").unwrap(), Some(Value::Integer(10)));
        assert!(region.is_empty());
    }

    #[test]
    fn test_transactional_writes_are_isolated() {
        let cache = Cache::new(GridConfig::default());
        let region = cache.region("accounts").unwrap();
        let ctx = ContextId::next();
        let other = ContextId::next();

        region.put(ctx, "alice", 1).unwrap();
        let id = cache.tx_manager().begin(ctx).unwrap();

        assert_eq!(region.put(ctx, "alice", 2).unwrap(), Some(Value::Integer(1)));
        region.remove(ctx, "bob").unwrap();
        assert_eq!(region.get(ctx, "alice").unwrap(), Some(Value::Integer(2)));
        assert_eq!(region.get(other, "alice").unwrap(), Some(Value::Integer(1)));

        cache.tx_manager().commit(ctx, id).unwrap();
        assert_eq!(region.get(other, "alice").unwrap(), Some(Value::Integer(2)));
        assert_eq!(region.keys(), vec!["alice".to_string()]);
    }
}
