//! Example: Preload a level while the frame loop keeps running

use std::thread;
use std::time::Duration;

use tarn_engine::{LevelLoader, TaskPool};

fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let pool = TaskPool::new();
    let loader = LevelLoader::new(|id: &str| {
        // Stand-in for the real level constructor.
        thread::sleep(Duration::from_millis(200));
        Ok(format!("level geometry for {id}"))
    });

    loader.preload("forest.lvl");

    pool.submit(
        || thread::sleep(Duration::from_millis(50)),
        || println!("asset decode finished"),
    );

    // A few frames of the driver loop while the level builds.
    for _ in 0..5 {
        pool.pump();
        thread::sleep(Duration::from_millis(16));
    }

    match loader.load("forest.lvl") {
        Ok(level) => println!("loaded: {level}"),
        Err(error) => eprintln!("load failed: {error}"),
    }
}
