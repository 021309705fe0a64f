//! Tarn Threading
//!
//! Locks, condition variables and worker-thread handles for the engine's
//! background-work subsystem.
//!
//! The engine drives background work from one owning thread; worker threads
//! hand results back through a small number of well-defined locks. These
//! types cover exactly those handoffs:
//! - [`Mutex`] / [`Lock`] / [`Condition`]: scoped locking with blocking and
//!   timed waits
//! - [`Thread`] / [`ThreadManager`]: one closure per OS thread, with join,
//!   detach and abandon
//! - [`ConcurrentCache`]: a shared key→value cache for results that are
//!   cloned out to consumers

mod cache;
mod sync;
mod thread;

pub use cache::ConcurrentCache;
pub use sync::{Condition, Lock, Mutex, WaitOutcome};
pub use thread::{Thread, ThreadManager};
