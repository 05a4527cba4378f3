use std::time::{Duration, Instant};

/// Initialize env_logger. `RUST_LOG` wins over the `debug` flag.
pub fn init_logging(debug: bool) {
    let filter = if debug { "debug" } else { "info" };

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{}] {} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}

pub const SLOW_THRESHOLD: Duration = Duration::from_secs(10);

/// Measures an operation; warns on drop if it ran longer than the threshold.
pub struct Timer {
    name: String,
    start: Instant,
    threshold: Duration,
}

impl Timer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            threshold: SLOW_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    pub fn is_slow(&self) -> bool {
        self.start.elapsed() > self.threshold
    }

    pub fn debug(&self, request_id: &str) {
        log::debug!("[{}] {} completed in {}ms", request_id, self.name, self.elapsed_ms());
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if self.is_slow() {
            log::warn!("{} took {}ms (slow!)", self.name, self.elapsed_ms());
        }
    }
}
