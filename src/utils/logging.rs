use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the fmt subscriber. `RUST_LOG` overrides the default filter.
    pub fn init() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kiln=info"));

        // A second init (tests, embedding) is not an error
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn task_start(name: &str) {
        info!("▶ Starting '{}'", name);
    }

    pub fn task_finished(name: &str, elapsed: std::time::Duration) {
        info!("✔ Finished '{}' after {:.2?}", name, elapsed);
    }

    pub fn cleaning(dir: &str) {
        info!("🧹 Cleaning {}", dir);
    }

    pub fn processing_file(name: &str, stage: &str) {
        debug!("⚡ Processing: {} ({})", name, stage);
    }

    pub fn file_failed(path: &str, stage: &str, message: &str) {
        error!("❌ {} failed at {}: {}", path, stage, message);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
