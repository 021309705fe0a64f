//! Worker Thread Handles
//!
//! One OS thread per handle, running a single closure to completion. A
//! handle owns its thread until it is joined, detached into a
//! [`ThreadManager`], or abandoned.

use std::fmt;
use std::thread::{self, JoinHandle};

use crate::sync::Mutex;

/// Owns one worker thread from spawn to join.
///
/// Dropping a running handle joins it; a worker only outlives its handle
/// after an explicit detach or abandon.
pub struct Thread {
    handle: Option<JoinHandle<()>>,
}

impl Thread {
    /// Start `f` on a new thread immediately; does not block.
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            handle: Some(thread::spawn(f)),
        }
    }

    /// Like [`Thread::spawn`], with a thread name for logs and debuggers.
    pub fn named<F>(name: &str, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(f)
            .expect("Failed to spawn worker thread");
        Self {
            handle: Some(handle),
        }
    }

    /// Block until the worker finishes, then empty the handle.
    ///
    /// Idempotent: joining an already-joined handle is a no-op. A panic that
    /// escaped the worker is logged here, not propagated.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }

    /// Sever the handle without waiting.
    ///
    /// The thread keeps running and whatever it holds is reclaimed only when
    /// it returns or the process exits. Restricted to shutdown paths that
    /// accept that.
    pub fn abandon(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::warn!(thread = ?handle.thread().name(), "abandoning a running worker thread");
            drop(handle);
        }
    }

    /// Hand ownership to `manager`, which joins all adopted threads when it
    /// is torn down.
    pub fn detach(mut self, manager: &ThreadManager) {
        if let Some(handle) = self.handle.take() {
            manager.adopt(handle);
        }
    }

    /// Whether the handle still owns its thread.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.join();
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

/// Collection point for detached threads.
///
/// Teardown joins (never abandons) every adopted thread, so no detached
/// worker outlives the manager.
#[derive(Debug, Default)]
pub struct ThreadManager {
    adopted: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadManager {
    pub fn new() -> Self {
        Self {
            adopted: Mutex::new(Vec::new()),
        }
    }

    fn adopt(&self, handle: JoinHandle<()>) {
        self.adopted.lock().push(handle);
    }

    /// Number of detached threads not yet joined.
    pub fn detached_count(&self) -> usize {
        self.adopted.lock().len()
    }
}

impl Drop for ThreadManager {
    fn drop(&mut self) {
        let handles = std::mem::take(&mut *self.adopted.lock());
        if handles.is_empty() {
            return;
        }
        tracing::debug!(count = handles.len(), "joining detached threads");
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("detached thread panicked");
            }
        }
    }
}
