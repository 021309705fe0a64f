//! Concurrent Cache
//!
//! A mutex-guarded map for results produced on worker threads and consumed
//! elsewhere. Values are cloned out; exclusive-ownership handoff lives in
//! the level loader, not here.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use crate::sync::Mutex;

/// Shared key→value cache.
#[derive(Debug, Default)]
pub struct ConcurrentCache<K, V> {
    map: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash, V: Clone> ConcurrentCache<K, V> {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Clone the value for `key` out of the cache, if present.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.lock().get(key).cloned()
    }

    /// Insert or replace the value for `key`.
    pub fn put(&self, key: K, value: V) {
        self.map.lock().insert(key, value);
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.lock().contains_key(key)
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.lock().remove(key)
    }

    pub fn clear(&self) {
        self.map.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}
