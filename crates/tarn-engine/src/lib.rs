//! Tarn Engine
//!
//! The engine's background-work subsystem: a generic asynchronous task
//! executor plus the concurrent level-loading paths built on it.
//!
//! - [`TaskPool`]: submit a job to run off the main thread; its completion
//!   callback is delivered on whichever thread calls [`TaskPool::pump`],
//!   typically once per frame.
//! - [`LevelLoader`]: start building a level in the background with
//!   [`LevelLoader::preload`]; [`LevelLoader::load`] hands the finished
//!   level to exactly one caller, blocking only while the build is still
//!   running.
//! - [`LevelDataCache`]: the same preload pattern for parsed level
//!   definitions, which are shared by value instead of owned.
//!
//! # Example
//! ```rust,ignore
//! use tarn_engine::{LevelLoader, TaskPool};
//!
//! let pool = TaskPool::new();
//! let loader = LevelLoader::new(|id| Level::from_file(id));
//!
//! loader.preload("forest.lvl");
//! pool.submit(|| decode_assets(), || tracing::info!("assets ready"));
//!
//! // once per frame:
//! pool.pump();
//!
//! let level = loader.load("forest.lvl")?;
//! ```

mod config;
mod data;
mod loader;
mod tasks;

pub use config::Config;
pub use data::LevelDataCache;
pub use loader::{BuildError, LevelError, LevelLoader};
pub use tasks::{CompleteFn, JobFn, TaskPool};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
