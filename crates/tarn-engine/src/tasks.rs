//! Background Task Pool
//!
//! Fire-and-forget jobs with a completion callback delivered on the pumping
//! thread. One worker thread per submitted task; workers report completion
//! through a list guarded by its own lock, and completion callbacks run
//! with no lock held.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tarn_threading::{Mutex, Thread};

use crate::config::Config;

/// Job function type; runs on a worker thread
pub type JobFn = Box<dyn FnOnce() + Send + 'static>;

/// Completion callback type; runs on the pumping thread
pub type CompleteFn = Box<dyn FnOnce() + 'static>;

struct PendingTask {
    on_complete: CompleteFn,
    thread: Option<Thread>,
}

/// Completion record appended by a worker when its job returns.
struct CompletedTask {
    id: u64,
    panic: Option<Box<dyn Any + Send>>,
}

/// Registry of in-flight background tasks.
///
/// Task ids are monotonic from 0 and never reused within a pool. Completion
/// callbacks fire in the order the jobs finished, not the order they were
/// submitted. Teardown pumps until every outstanding task has completed and
/// had its callback delivered; no task is silently dropped.
pub struct TaskPool {
    next_task_id: AtomicU64,
    /// In-flight tasks; guarded separately from `completed`. A completion
    /// callback may re-enter [`TaskPool::submit`].
    tasks: Mutex<HashMap<u64, PendingTask>>,
    /// Ids of finished jobs, in completion order. Workers only ever touch
    /// this lock.
    completed: Arc<Mutex<Vec<CompletedTask>>>,
    config: Config,
}

impl TaskPool {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            next_task_id: AtomicU64::new(0),
            tasks: Mutex::new(HashMap::new()),
            completed: Arc::new(Mutex::new(Vec::new())),
            config,
        }
    }

    /// Submit a job to run on its own worker thread.
    ///
    /// Returns the task id immediately; `on_complete` runs on a later
    /// [`TaskPool::pump`] once the job has finished.
    pub fn submit<J, C>(&self, job: J, on_complete: C) -> u64
    where
        J: FnOnce() + Send + 'static,
        C: FnOnce() + 'static,
    {
        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let job: JobFn = Box::new(job);

        let completed = Arc::clone(&self.completed);
        let name = format!("{}-task-{id}", self.config.thread_name_prefix);
        let thread = Thread::named(&name, move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job));
            completed.lock().push(CompletedTask {
                id,
                panic: outcome.err(),
            });
        });

        self.tasks.lock().insert(
            id,
            PendingTask {
                on_complete: Box::new(on_complete),
                thread: Some(thread),
            },
        );
        tracing::trace!(id, "submitted background task");
        id
    }

    /// Deliver completion callbacks for every job that has finished.
    ///
    /// Swaps the completed list out under its lock, then runs the callbacks
    /// outside any lock, in completion order. A job that panicked has its
    /// payload re-raised here, on the pumping thread, after the rest of the
    /// batch has been delivered.
    pub fn pump(&self) {
        let completed = mem::take(&mut *self.completed.lock());
        let mut reraise = None;

        for done in completed {
            let Some(mut task) = self.tasks.lock().remove(&done.id) else {
                continue;
            };
            // The worker already finished; this join only reclaims it.
            task.thread.take();

            match done.panic {
                None => (task.on_complete)(),
                Some(payload) => {
                    tracing::error!(id = done.id, "background job panicked");
                    reraise.get_or_insert(payload);
                }
            }
        }

        if let Some(payload) = reraise {
            panic::resume_unwind(payload);
        }
    }

    /// Number of submitted tasks whose callback has not yet been delivered.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_tasks() == 0
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        let outstanding = self.pending_tasks();
        if outstanding == 0 {
            return;
        }
        tracing::debug!(outstanding, "draining task pool");
        loop {
            self.pump();
            if self.tasks.lock().is_empty() {
                break;
            }
            std::thread::sleep(self.config.teardown_poll);
        }
    }
}
