//! Subsystem Configuration

use std::time::Duration;

/// Background-work configuration options
#[derive(Debug, Clone)]
pub struct Config {
    /// Name prefix for spawned worker threads
    pub thread_name_prefix: String,

    /// Pause between drain rounds while a pool tears down
    pub teardown_poll: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thread_name_prefix: "tarn-worker".to_string(),
            teardown_poll: Duration::from_millis(1),
        }
    }
}
