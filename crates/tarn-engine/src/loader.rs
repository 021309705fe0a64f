//! Concurrent Level Loading
//!
//! Preload a level on a worker thread while the frame loop keeps running;
//! `load` blocks only while the build is still in flight. Requests for the
//! same level id are deduplicated, and a finished background build is handed
//! to exactly one caller.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tarn_threading::{Mutex, Thread};

use crate::config::Config;

/// Error type a level builder may return
pub type BuildError = Box<dyn std::error::Error + Send + Sync>;

type BuildFn<L> = dyn Fn(&str) -> Result<L, BuildError> + Send + Sync;

/// Level loading failure, surfaced on the thread that consumes the level.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("failed to build level `{id}`: {source}")]
    Build {
        id: String,
        #[source]
        source: BuildError,
    },

    #[error("background build of level `{id}` panicked: {message}")]
    BuildPanicked { id: String, message: String },
}

/// One registered load: in flight while `level` is `None`, finished and
/// unclaimed once the worker has stored a result.
struct LoadSlot<L> {
    thread: Option<Thread>,
    level: Option<Result<L, LevelError>>,
}

/// Cache and dedup point for background level builds.
///
/// The builder callable is the engine's level constructor; it must be safe
/// to run on a worker thread, which holds as long as no two builds for the
/// same id race (guaranteed here) and the build touches nothing owned by
/// the render thread (upheld by the caller).
pub struct LevelLoader<L: Send + 'static> {
    build: Arc<BuildFn<L>>,
    /// Guards presence and the (thread, level) pair for every id. The
    /// worker's store of the finished level happens-before the join a
    /// consumer performs in [`LevelLoader::load`].
    loading: Arc<Mutex<HashMap<String, LoadSlot<L>>>>,
    thread_name_prefix: String,
}

impl<L: Send + 'static> LevelLoader<L> {
    pub fn new<B>(build: B) -> Self
    where
        B: Fn(&str) -> Result<L, BuildError> + Send + Sync + 'static,
    {
        Self::with_config(Config::default(), build)
    }

    pub fn with_config<B>(config: Config, build: B) -> Self
    where
        B: Fn(&str) -> Result<L, BuildError> + Send + Sync + 'static,
    {
        Self {
            build: Arc::new(build),
            loading: Arc::new(Mutex::new(HashMap::new())),
            thread_name_prefix: config.thread_name_prefix,
        }
    }

    /// Start building `id` in the background if no build for it is already
    /// in flight or finished-unclaimed. Never blocks the caller.
    pub fn preload(&self, id: &str) {
        debug_assert!(!id.is_empty());

        let mut loading = self.loading.lock();
        if loading.contains_key(id) {
            return;
        }
        tracing::debug!(level = id, "preloading level in the background");

        let build = Arc::clone(&self.build);
        let registry = Arc::clone(&self.loading);
        let key = id.to_string();
        let worker_key = key.clone();
        let name = format!("{}-level", self.thread_name_prefix);
        let thread = Thread::named(&name, move || {
            let result = run_build(&*build, &worker_key);
            if let Some(slot) = registry.lock().get_mut(&worker_key) {
                slot.level = Some(result);
            }
            // Entry gone means the loader was torn down; the result is
            // dropped right here, on the worker.
        });

        loading.insert(
            key,
            LoadSlot {
                thread: Some(thread),
                level: None,
            },
        );
    }

    /// Return the level for `id`, blocking only if a preloaded build is
    /// still in flight.
    ///
    /// A preloaded id is claimed exactly once: the registry entry is erased
    /// and ownership of the level transfers to this caller. Ids that were
    /// never preloaded (or were already claimed) are built synchronously on
    /// the calling thread and never touch the registry.
    pub fn load(&self, id: &str) -> Result<L, LevelError> {
        let registered = {
            let mut loading = self.loading.lock();
            loading.get_mut(id).map(|slot| slot.thread.take())
        };
        let Some(in_flight) = registered else {
            return self.build_now(id);
        };

        // Join outside the registry lock; the worker takes that lock for its
        // final store.
        if let Some(mut thread) = in_flight {
            thread.join();
        }

        let slot = self.loading.lock().remove(id);
        match slot.and_then(|slot| slot.level) {
            Some(result) => {
                tracing::debug!(level = id, "claimed background-loaded level");
                result
            }
            // The worker produced nothing for this entry; fall back to a
            // build on the calling thread.
            None => self.build_now(id),
        }
    }

    /// Number of preloaded ids not yet claimed by [`LevelLoader::load`].
    pub fn pending_loads(&self) -> usize {
        self.loading.lock().len()
    }

    fn build_now(&self, id: &str) -> Result<L, LevelError> {
        tracing::debug!(level = id, "building level synchronously");
        (self.build)(id).map_err(|source| LevelError::Build {
            id: id.to_string(),
            source,
        })
    }
}

impl<L: Send + 'static> fmt::Debug for LevelLoader<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelLoader")
            .field("pending_loads", &self.pending_loads())
            .finish()
    }
}

impl<L: Send + 'static> Drop for LevelLoader<L> {
    fn drop(&mut self) {
        let slots: Vec<LoadSlot<L>> = {
            let mut loading = self.loading.lock();
            loading.drain().map(|(_, slot)| slot).collect()
        };
        if slots.is_empty() {
            return;
        }
        tracing::debug!(outstanding = slots.len(), "joining outstanding level loads");
        for mut slot in slots {
            if let Some(mut thread) = slot.thread.take() {
                thread.join();
            }
            // Unclaimed levels are dropped with their slot.
        }
    }
}

/// Run one background build, capturing builder errors and panics so they
/// can surface on the consuming thread.
fn run_build<L>(build: &BuildFn<L>, id: &str) -> Result<L, LevelError> {
    match panic::catch_unwind(AssertUnwindSafe(|| build(id))) {
        Ok(Ok(level)) => Ok(level),
        Ok(Err(source)) => {
            tracing::error!(level = id, error = %source, "background level build failed");
            Err(LevelError::Build {
                id: id.to_string(),
                source,
            })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(level = id, panic = %message, "background level build panicked");
            Err(LevelError::BuildPanicked {
                id: id.to_string(),
                message,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
