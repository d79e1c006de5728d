use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Total download attempts per resolve before giving up.
pub const DOWNLOAD_MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between download attempts.
pub const DOWNLOAD_RETRY_DELAY_SECS: u64 = 2;

/// Age after which cached media files are removed by `cleanup` (7 days).
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Suffix of files still being written by a download.
pub const PARTIAL_FILE_SUFFIX: &str = ".part";

/// Length of one countdown step of the breathing driver.
pub const PHASE_TICK_MILLIS: u64 = 1000;

/// Host probed by the TCP connectivity check.
pub const CONNECTIVITY_PROBE_HOST: &str = "clients3.google.com";

/// Port probed by the TCP connectivity check.
pub const CONNECTIVITY_PROBE_PORT: u16 = 443;

/// Connect timeout for the connectivity probe.
pub const CONNECTIVITY_PROBE_TIMEOUT_MILLIS: u64 = 3000;

/// Local storage key holding the JSON-encoded breathing settings.
pub const BREATHING_SETTINGS_KEY: &str = "breathingSettings";

/// Local storage key prefix for per-exercise completion flags.
pub const COMPLETION_FLAG_PREFIX: &str = "completed_";

/// Configuration for a media resource cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding downloaded media files.
    pub cache_dir: PathBuf,
    /// Download attempts before a resolve fails.
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::new(),
            max_attempts: DOWNLOAD_MAX_ATTEMPTS,
            retry_delay_ms: DOWNLOAD_RETRY_DELAY_SECS * 1000,
        }
    }
}
