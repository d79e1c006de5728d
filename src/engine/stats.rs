// Cache statistics: hit rates, download attempts and transferred bytes.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStatsSnapshot {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub coalesced: u64,
    pub downloads: u64,
    pub attempts: u64,
    pub failures: u64,
    pub corrupted: u64,
    pub downloaded_bytes: u64,
    pub hit_rate: f64,
}

pub struct StatsCollector {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    coalesced: AtomicU64,
    downloads: AtomicU64,
    attempts: AtomicU64,
    failures: AtomicU64,
    corrupted: AtomicU64,
    downloaded_bytes: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            corrupted: AtomicU64::new(0),
            downloaded_bytes: AtomicU64::new(0),
        }
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A resolve attached to a download that was already running.
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download_started(&self) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corrupted(&self) {
        self.corrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_downloaded(&self, bytes: u64) {
        self.downloaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let memory_hits = self.memory_hits.load(Ordering::Relaxed);
        let disk_hits = self.disk_hits.load(Ordering::Relaxed);
        let coalesced = self.coalesced.load(Ordering::Relaxed);
        let downloads = self.downloads.load(Ordering::Relaxed);

        let lookups = memory_hits + disk_hits + coalesced + downloads;
        let hit_rate = if lookups > 0 {
            (memory_hits + disk_hits) as f64 / lookups as f64
        } else {
            0.0
        };

        CacheStatsSnapshot {
            memory_hits,
            disk_hits,
            coalesced,
            downloads,
            attempts: self.attempts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            corrupted: self.corrupted.load(Ordering::Relaxed),
            downloaded_bytes: self.downloaded_bytes.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_basic() {
        let stats = StatsCollector::new();
        stats.record_downloaded(1000);
        stats.record_downloaded(500);
        stats.record_memory_hit();
        stats.record_memory_hit();
        stats.record_disk_hit();
        stats.record_download_started();
        stats.record_attempt();
        stats.record_attempt();

        let snap = stats.snapshot();
        assert_eq!(snap.downloaded_bytes, 1500);
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.downloads, 1);
        assert!((snap.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_hit_rate_is_zero() {
        assert_eq!(StatsCollector::new().snapshot().hit_rate, 0.0);
    }
}
