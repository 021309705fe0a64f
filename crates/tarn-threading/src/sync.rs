//! Synchronization Primitives
//!
//! Scoped locking over the standard library types. A poisoned lock is
//! recovered and logged rather than propagated.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, MutexGuard};
use std::time::Duration;

/// Mutual exclusion around a value.
///
/// Not clonable; share a lock between threads with `Arc`.
#[derive(Debug, Default)]
pub struct Mutex<T> {
    inner: std::sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: std::sync::Mutex::new(value),
        }
    }

    /// Acquire the lock, blocking until it is free.
    ///
    /// The returned guard releases the lock on every exit path. If a previous
    /// holder panicked, the poisoned state is recovered and logged.
    pub fn lock(&self) -> Lock<'_, T> {
        let guard = self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("recovering a mutex poisoned by a panicked holder");
            poisoned.into_inner()
        });
        Lock { guard }
    }
}

/// Scoped lock guard; acquired by [`Mutex::lock`], released on drop.
#[must_use]
pub struct Lock<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for Lock<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for Lock<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for Lock<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Result of a timed wait on a [`Condition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Woken by a signal before the timeout elapsed
    Signaled,
    /// The timeout elapsed without a signal
    TimedOut,
    /// The wait completed abnormally (recovered from a poisoned lock)
    Failed,
}

/// Condition variable tied to a [`Mutex`] at each wait site.
#[derive(Debug, Default)]
pub struct Condition {
    inner: Condvar,
}

impl Condition {
    pub fn new() -> Self {
        Self {
            inner: Condvar::new(),
        }
    }

    /// Release `lock` for the duration of the wait and reacquire it on
    /// wakeup. May wake spuriously; callers loop on their predicate.
    pub fn wait<'a, T>(&self, lock: Lock<'a, T>) -> Lock<'a, T> {
        let guard = self.inner.wait(lock.guard).unwrap_or_else(|poisoned| {
            tracing::warn!("condition wait recovered a poisoned mutex");
            poisoned.into_inner()
        });
        Lock { guard }
    }

    /// Like [`Condition::wait`], but wakes after `timeout` at the latest.
    pub fn wait_timeout<'a, T>(
        &self,
        lock: Lock<'a, T>,
        timeout: Duration,
    ) -> (Lock<'a, T>, WaitOutcome) {
        match self.inner.wait_timeout(lock.guard, timeout) {
            Ok((guard, timed_out)) => {
                let outcome = if timed_out.timed_out() {
                    WaitOutcome::TimedOut
                } else {
                    WaitOutcome::Signaled
                };
                (Lock { guard }, outcome)
            }
            Err(poisoned) => {
                tracing::error!("timed condition wait recovered a poisoned mutex");
                let (guard, _) = poisoned.into_inner();
                (Lock { guard }, WaitOutcome::Failed)
            }
        }
    }

    /// Wake one waiter (unspecified which, if several).
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wake all current waiters.
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}
