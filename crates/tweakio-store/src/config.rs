//! Storage engine configuration.
//!
//! Every setting has a default; `from_env` overlays environment variables on
//! top of them.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Storage engine configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// SQLite database file. Parent directories are created on start.
    pub db_path: PathBuf,

    /// Flush as soon as this many messages are pending.
    /// Env: `TWEAKIO_BATCH_SIZE`
    /// Default: `50`
    pub batch_size: usize,

    /// Flush a non-empty batch at least this often; also the queue poll timeout.
    /// Env: `TWEAKIO_FLUSH_INTERVAL_MS`
    /// Default: `2000`
    pub flush_interval: Duration,

    /// Pause after a failed flush before the next attempt.
    /// Env: `TWEAKIO_RETRY_BACKOFF_MS`
    /// Default: `1000`
    pub retry_backoff: Duration,

    /// Consecutive failed flushes before the engine reports `Degraded`.
    /// Env: `TWEAKIO_DEGRADE_AFTER`
    /// Default: `5`
    pub degrade_after: u32,

    /// Attempts made for the residual batch on close.
    pub final_flush_attempts: u32,

    /// Keep `raw_data` next to the ciphertext when encryption is enabled.
    /// Env: `TWEAKIO_RETAIN_PLAINTEXT` (true/false)
    /// Default: `false`
    pub retain_plaintext: bool,
}

impl StorageConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            batch_size: 50,
            flush_interval: Duration::from_secs(2),
            retry_backoff: Duration::from_secs(1),
            degrade_after: 5,
            final_flush_attempts: 3,
            retain_plaintext: false,
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env(db_path: impl Into<PathBuf>) -> Self {
        Self::from_lookup(db_path, |name| std::env::var(name).ok())
    }

    fn from_lookup(
        db_path: impl Into<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self::new(db_path);

        if let Some(n) = parse_var::<usize>(&lookup, "TWEAKIO_BATCH_SIZE") {
            config.batch_size = n;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TWEAKIO_FLUSH_INTERVAL_MS") {
            config.flush_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TWEAKIO_RETRY_BACKOFF_MS") {
            config.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<u32>(&lookup, "TWEAKIO_DEGRADE_AFTER") {
            config.degrade_after = n;
        }
        if let Some(val) = lookup("TWEAKIO_RETAIN_PLAINTEXT") {
            config.retain_plaintext = val == "true" || val == "1";
        }

        config.normalized()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self.normalized()
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self.normalized()
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn with_degrade_after(mut self, degrade_after: u32) -> Self {
        self.degrade_after = degrade_after;
        self.normalized()
    }

    pub fn with_retain_plaintext(mut self, retain: bool) -> Self {
        self.retain_plaintext = retain;
        self
    }

    // Zero would never flush (or flush on every poll); clamp to usable values.
    fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.degrade_after = self.degrade_after.max(1);
        self.final_flush_attempts = self.final_flush_attempts.max(1);
        if self.flush_interval.is_zero() {
            self.flush_interval = Duration::from_millis(1);
        }
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "invalid value, using default");
            None
        }
    }
}
