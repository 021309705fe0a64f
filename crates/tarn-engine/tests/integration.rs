//! Integration tests - background tasks and concurrent level loading
//!
//! Drives the pool and loaders the way a frame loop would: submit/preload,
//! pump, then consume results.

use std::cell::{Cell, RefCell};
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tarn_engine::{Config, LevelDataCache, LevelError, LevelLoader, TaskPool};

const PUMP_DEADLINE: Duration = Duration::from_secs(10);

/// Pump `pool` until `done` holds, failing the test if it never does.
fn pump_until(pool: &TaskPool, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        assert!(start.elapsed() < PUMP_DEADLINE, "pump deadline exceeded");
        pool.pump();
        thread::sleep(Duration::from_millis(1));
    }
}

/// Stand-in level: remembers which build produced it and counts drops.
struct TestLevel {
    id: String,
    build_seq: usize,
    drops: Arc<AtomicUsize>,
}

impl Drop for TestLevel {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_loader(
    builds: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
) -> LevelLoader<TestLevel> {
    LevelLoader::new(move |id: &str| {
        let build_seq = builds.fetch_add(1, Ordering::SeqCst);
        Ok(TestLevel {
            id: id.to_string(),
            build_seq,
            drops: Arc::clone(&drops),
        })
    })
}

// ============================================================================
// TASK POOL
// ============================================================================

#[test]
fn test_callback_fires_once_and_only_after_job() {
    let pool = TaskPool::new();
    let job_finished = Arc::new(AtomicBool::new(false));
    let calls = Rc::new(Cell::new(0u32));
    let job_was_done = Rc::new(Cell::new(false));

    let worker_flag = Arc::clone(&job_finished);
    let callback_flag = Arc::clone(&job_finished);
    let calls_in_callback = Rc::clone(&calls);
    let observed = Rc::clone(&job_was_done);
    pool.submit(
        move || {
            thread::sleep(Duration::from_millis(20));
            worker_flag.store(true, Ordering::SeqCst);
        },
        move || {
            calls_in_callback.set(calls_in_callback.get() + 1);
            observed.set(callback_flag.load(Ordering::SeqCst));
        },
    );

    pump_until(&pool, || calls.get() == 1);
    assert!(job_was_done.get(), "callback ran before its job finished");

    // Further pumps must not re-deliver the callback.
    for _ in 0..5 {
        pool.pump();
    }
    assert_eq!(calls.get(), 1);
    assert!(pool.is_idle());
}

#[test]
fn test_callbacks_follow_completion_order_not_submission_order() {
    let pool = TaskPool::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    let slow = Rc::clone(&order);
    pool.submit(
        || thread::sleep(Duration::from_millis(150)),
        move || slow.borrow_mut().push("slow"),
    );
    let quick = Rc::clone(&order);
    pool.submit(
        || thread::sleep(Duration::from_millis(5)),
        move || quick.borrow_mut().push("quick"),
    );

    pump_until(&pool, || order.borrow().len() == 2);
    assert_eq!(*order.borrow(), vec!["quick", "slow"]);
}

#[test]
fn test_teardown_delivers_every_callback() {
    let jobs_done = Arc::new(AtomicUsize::new(0));
    let callbacks_done = Rc::new(Cell::new(0usize));

    {
        let pool = TaskPool::new();
        for i in 0..4u64 {
            let jobs = Arc::clone(&jobs_done);
            let callbacks = Rc::clone(&callbacks_done);
            pool.submit(
                move || {
                    thread::sleep(Duration::from_millis(10 * (i + 1)));
                    jobs.fetch_add(1, Ordering::SeqCst);
                },
                move || callbacks.set(callbacks.get() + 1),
            );
        }
    }

    // Drop returned, so every job ran and every callback was delivered.
    assert_eq!(jobs_done.load(Ordering::SeqCst), 4);
    assert_eq!(callbacks_done.get(), 4);
}

#[test]
fn test_completion_callback_may_submit_again() {
    let pool = Rc::new(TaskPool::new());
    let chained = Rc::new(Cell::new(false));

    let resubmit_pool = Rc::clone(&pool);
    let chained_flag = Rc::clone(&chained);
    pool.submit(
        || (),
        move || {
            let done = Rc::clone(&chained_flag);
            resubmit_pool.submit(|| (), move || done.set(true));
        },
    );

    pump_until(&pool, || chained.get());
}

#[test]
fn test_panicking_job_surfaces_in_pump() {
    let pool = TaskPool::new();
    pool.submit(|| panic!("job exploded"), || ());

    let start = Instant::now();
    let payload = loop {
        assert!(start.elapsed() < PUMP_DEADLINE, "panic never surfaced");
        match std::panic::catch_unwind(AssertUnwindSafe(|| pool.pump())) {
            Ok(()) => thread::sleep(Duration::from_millis(1)),
            Err(payload) => break payload,
        }
    };

    assert_eq!(payload.downcast_ref::<&str>(), Some(&"job exploded"));
    assert!(pool.is_idle());
}

#[test]
fn test_workers_are_named_from_config() {
    let config = Config {
        thread_name_prefix: "alpha".to_string(),
        ..Config::default()
    };
    let pool = TaskPool::with_config(config);

    let seen = Arc::new(std::sync::Mutex::new(String::new()));
    let worker_seen = Arc::clone(&seen);
    pool.submit(
        move || {
            let name = thread::current().name().unwrap_or("").to_string();
            *worker_seen.lock().unwrap() = name;
        },
        || (),
    );
    drop(pool);

    assert!(seen.lock().unwrap().starts_with("alpha-task-"));
}

// ============================================================================
// LEVEL LOADER
// ============================================================================

#[test]
fn test_load_without_preload_builds_fresh_each_time() {
    let builds = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));
    let loader = counting_loader(Arc::clone(&builds), Arc::clone(&drops));

    let first = loader.load("cave.lvl").unwrap();
    let second = loader.load("cave.lvl").unwrap();

    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_ne!(first.build_seq, second.build_seq);
    assert_eq!(loader.pending_loads(), 0);
}

#[test]
fn test_preload_dedup_and_single_claim() {
    let builds = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));
    let loader = counting_loader(Arc::clone(&builds), Arc::clone(&drops));

    loader.preload("forest.lvl");
    loader.preload("forest.lvl");

    let level = loader.load("forest.lvl").unwrap();
    assert_eq!(level.id, "forest.lvl");
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    // The id is no longer cached; a second load is an independent build.
    let again = loader.load("forest.lvl").unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_ne!(level.build_seq, again.build_seq);
}

#[test]
fn test_load_waits_for_inflight_build() {
    let builds = Arc::new(AtomicUsize::new(0));
    let build_count = Arc::clone(&builds);
    let loader = LevelLoader::new(move |id: &str| {
        thread::sleep(Duration::from_millis(100));
        build_count.fetch_add(1, Ordering::SeqCst);
        Ok(id.to_string())
    });

    loader.preload("swamp.lvl");
    let level = loader.load("swamp.lvl").unwrap();

    assert_eq!(level, "swamp.lvl");
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[test]
fn test_teardown_joins_builders_and_drops_unclaimed_levels() {
    let builds = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));

    {
        let loader = counting_loader(Arc::clone(&builds), Arc::clone(&drops));
        loader.preload("a.lvl");
        loader.preload("b.lvl");

        let claimed = loader.load("a.lvl").unwrap();
        assert_eq!(claimed.id, "a.lvl");
    }

    // Both builds completed; the claimed level and the unclaimed one are
    // both gone by the time teardown returns.
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn test_background_build_error_surfaces_at_load() {
    let loader: LevelLoader<()> =
        LevelLoader::new(|id: &str| Err(format!("corrupt header in {id}").into()));

    loader.preload("broken.lvl");
    let error = loader.load("broken.lvl").unwrap_err();

    assert!(matches!(error, LevelError::Build { .. }));
    assert!(error.to_string().contains("broken.lvl"));
    assert_eq!(loader.pending_loads(), 0);
}

#[test]
fn test_background_build_panic_surfaces_at_load() {
    let loader: LevelLoader<()> = LevelLoader::new(|_: &str| panic!("builder blew up"));

    loader.preload("doomed.lvl");
    let error = loader.load("doomed.lvl").unwrap_err();

    assert!(matches!(error, LevelError::BuildPanicked { .. }));
    assert!(error.to_string().contains("builder blew up"));
}

// ============================================================================
// LEVEL DATA CACHE
// ============================================================================

#[test]
fn test_data_preload_fetches_once_and_stays_cached() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let fetch_count = Arc::clone(&fetches);
    let cache = LevelDataCache::new(move |id: &str| {
        fetch_count.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        Ok(format!("data:{id}"))
    });

    cache.preload("forest.lvl");
    cache.preload("forest.lvl");

    assert_eq!(cache.load("forest.lvl").unwrap(), "data:forest.lvl");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    // Unlike built levels, definitions stay resident after a load.
    assert_eq!(cache.load("forest.lvl").unwrap(), "data:forest.lvl");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    cache.clear();
    assert_eq!(cache.load("forest.lvl").unwrap(), "data:forest.lvl");
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[test]
fn test_data_background_failure_surfaces_at_load() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempt_count = Arc::clone(&attempts);
    let cache: LevelDataCache<String> = LevelDataCache::new(move |_: &str| {
        attempt_count.fetch_add(1, Ordering::SeqCst);
        Err("corrupt header".into())
    });

    cache.preload("bad.lvl");
    let error = cache.load("bad.lvl").unwrap_err();

    assert!(matches!(error, LevelError::Build { .. }));
    // One background attempt plus the synchronous retry at load.
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(cache.cached("bad.lvl").is_none());
}
