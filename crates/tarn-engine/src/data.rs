//! Level Data Cache
//!
//! The lighter sibling of the level loader: parsed level definitions are
//! fetched in the background into a shared cache and cloned out to callers.
//! Unlike a built level, a definition stays cached until [`LevelDataCache::clear`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tarn_threading::{ConcurrentCache, Mutex, Thread};

use crate::config::Config;
use crate::loader::{BuildError, LevelError};

type FetchFn<V> = dyn Fn(&str) -> Result<V, BuildError> + Send + Sync;

/// Cache of parsed level definitions keyed by level id.
pub struct LevelDataCache<V: Clone + Send + 'static> {
    fetch: Arc<FetchFn<V>>,
    cache: Arc<ConcurrentCache<String, V>>,
    /// In-flight fetches. Presence here is what makes a duplicate preload a
    /// no-op before the value lands in the cache.
    fetching: Mutex<HashMap<String, Thread>>,
    thread_name_prefix: String,
}

impl<V: Clone + Send + 'static> LevelDataCache<V> {
    pub fn new<F>(fetch: F) -> Self
    where
        F: Fn(&str) -> Result<V, BuildError> + Send + Sync + 'static,
    {
        Self::with_config(Config::default(), fetch)
    }

    pub fn with_config<F>(config: Config, fetch: F) -> Self
    where
        F: Fn(&str) -> Result<V, BuildError> + Send + Sync + 'static,
    {
        Self {
            fetch: Arc::new(fetch),
            cache: Arc::new(ConcurrentCache::new()),
            fetching: Mutex::new(HashMap::new()),
            thread_name_prefix: config.thread_name_prefix,
        }
    }

    /// Start fetching the definition for `id` in the background. No-op if a
    /// fetch is already in flight or the value is cached.
    pub fn preload(&self, id: &str) {
        let mut fetching = self.fetching.lock();
        if fetching.contains_key(id) || self.cache.contains(id) {
            return;
        }
        tracing::debug!(level = id, "prefetching level data");

        let fetch = Arc::clone(&self.fetch);
        let cache = Arc::clone(&self.cache);
        let key = id.to_string();
        let worker_key = key.clone();
        let name = format!("{}-data", self.thread_name_prefix);
        let thread = Thread::named(&name, move || match fetch(&worker_key) {
            Ok(value) => cache.put(worker_key, value),
            // A failed prefetch leaves the cache empty; `load` retries
            // synchronously and the error surfaces there.
            Err(error) => {
                tracing::error!(level = %worker_key, error = %error, "background level data fetch failed");
            }
        });

        fetching.insert(key, thread);
    }

    /// Return the definition for `id`, waiting for an in-flight fetch and
    /// falling back to a synchronous fetch on a miss.
    pub fn load(&self, id: &str) -> Result<V, LevelError> {
        let in_flight = self.fetching.lock().remove(id);
        if let Some(mut thread) = in_flight {
            thread.join();
        }
        if let Some(value) = self.cache.get(id) {
            return Ok(value);
        }

        let value = (self.fetch)(id).map_err(|source| LevelError::Build {
            id: id.to_string(),
            source,
        })?;
        self.cache.put(id.to_string(), value.clone());
        Ok(value)
    }

    /// Cached definition for `id`, without fetching.
    pub fn cached(&self, id: &str) -> Option<V> {
        self.cache.get(id)
    }

    /// Drop every cached definition. In-flight fetches still land.
    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

impl<V: Clone + Send + 'static> fmt::Debug for LevelDataCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelDataCache")
            .field("cached", &self.cache.len())
            .field("fetching", &self.fetching.lock().len())
            .finish()
    }
}

impl<V: Clone + Send + 'static> Drop for LevelDataCache<V> {
    fn drop(&mut self) {
        let threads: Vec<Thread> = {
            let mut fetching = self.fetching.lock();
            fetching.drain().map(|(_, thread)| thread).collect()
        };
        for mut thread in threads {
            thread.join();
        }
    }
}
