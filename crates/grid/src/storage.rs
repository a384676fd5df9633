//! Committed region data
//!
//! Every key carries a version that is bumped on each committed write.
//! Transactions remember the version they first saw so that commit can
//! detect entries changed underneath them.

use crate::value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    /// `None` once removed; the version survives removal
    pub value: Option<Value>,
    pub version: u64,
}

#[derive(Default)]
pub(crate) struct RegionStore {
    pub(crate) entries: RwLock<HashMap<String, Entry>>,
}

impl RegionStore {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).and_then(|e| e.value.clone())
    }

    /// Committed version of `key`, zero if never written
    pub fn version(&self, key: &str) -> u64 {
        self.entries.read().get(key).map_or(0, |e| e.version)
    }

    /// Write outside any transaction, returning the previous value
    pub fn write_direct(&self, key: String, value: Option<Value>) -> Option<Value> {
        let mut entries = self.entries.write();
        let entry = entries.entry(key).or_insert(Entry {
            value: None,
            version: 0,
        });
        entry.version += 1;
        std::mem::replace(&mut entry.value, value)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|e| e.value.is_some())
            .count()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.value.is_some())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_survive_removal() {
        let store = RegionStore::default();
        assert_eq!(store.version("k"), 0);

        assert_eq!(store.write_direct("k".into(), Some(1.into())), None);
        assert_eq!(store.version("k"), 1);
        assert_eq!(store.len(), 1);

        assert_eq!(store.write_direct("k".into(), None), Some(Value::Integer(1)));
        assert_eq!(store.version("k"), 2);
        assert_eq!(store.len(), 0);
        assert!(store.keys().is_empty());
    }
}
