// Media resource cache: resolves assets to local files, coalescing concurrent downloads.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use reqwest::Url;
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::downloader::Downloader;
use super::stats::{CacheStatsSnapshot, StatsCollector};
use crate::config::{CacheConfig, PARTIAL_FILE_SUFFIX};
use crate::error::CacheError;
use crate::source::traits::{Connectivity, MediaSource};

/// Progress callback receiving the downloaded fraction in `[0, 1]`.
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Category of cached media. Each kind gets its own subdirectory.
pub trait MediaKind: Send + Sync + 'static {
    const NAME: &'static str;
}

/// Guided audio clips (WAV).
pub struct Audio;

impl MediaKind for Audio {
    const NAME: &'static str = "audio";
}

/// Phase visuals (M4V).
pub struct Video;

impl MediaKind for Video {
    const NAME: &'static str = "video";
}

/// A downloadable media resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaAsset {
    pub remote_url: String,
    /// Local file name; identifies at most one file and one download.
    pub cache_key: String,
}

impl MediaAsset {
    pub fn new(remote_url: impl Into<String>, cache_key: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            cache_key: cache_key.into(),
        }
    }

    fn validate(&self) -> Result<(), CacheError> {
        let key = self.cache_key.as_str();
        if key.is_empty()
            || key == "."
            || key == ".."
            || key.ends_with(PARTIAL_FILE_SUFFIX)
            || key.contains(['/', '\\', '\0'])
        {
            return Err(CacheError::InvalidAsset(format!(
                "cache key {:?} is not a safe file name",
                key
            )));
        }
        Url::parse(&self.remote_url).map_err(|e| {
            CacheError::InvalidAsset(format!("url {:?} is not absolute: {}", self.remote_url, e))
        })?;
        Ok(())
    }
}

/// Lifecycle of a cache key as seen by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Absent,
    Downloading,
    Ready,
    /// The last download exhausted its attempts; the next resolve retries.
    Failed,
}

#[derive(Clone)]
enum Transfer {
    Progress(f32),
    Done(Result<PathBuf, CacheError>),
}

#[derive(Default)]
struct Tables {
    ready: HashMap<String, PathBuf>,
    in_flight: HashMap<String, watch::Receiver<Transfer>>,
    failed: HashSet<String>,
}

struct CacheInner {
    dir: PathBuf,
    downloader: Downloader,
    connectivity: Arc<dyn Connectivity>,
    stats: Arc<StatsCollector>,
    tables: Mutex<Tables>,
}

/// Cache of downloaded media of kind `K`.
///
/// Cloning yields another handle onto the same tables.
pub struct ResourceCache<K: MediaKind> {
    inner: Arc<CacheInner>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: MediaKind> Clone for ResourceCache<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _kind: PhantomData,
        }
    }
}

impl<K: MediaKind> ResourceCache<K> {
    pub fn new(
        config: &CacheConfig,
        source: Arc<dyn MediaSource>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let stats = Arc::new(StatsCollector::new());
        let downloader = Downloader::new(
            source,
            Arc::clone(&stats),
            config.max_attempts,
            config.retry_delay(),
        );
        Self {
            inner: Arc::new(CacheInner {
                dir: config.cache_dir.join(K::NAME),
                downloader,
                connectivity,
                stats,
                tables: Mutex::new(Tables::default()),
            }),
            _kind: PhantomData,
        }
    }

    /// Directory holding this kind's files.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Resolve `asset` to a local file, downloading it on first use.
    ///
    /// Concurrent calls for the same key share one download.
    pub async fn resolve(
        &self,
        asset: &MediaAsset,
        progress: Option<ProgressFn>,
    ) -> Result<PathBuf, CacheError> {
        asset.validate()?;
        if self.inner.downloader.is_shut_down() {
            return Err(CacheError::DownloadFailed {
                key: asset.cache_key.clone(),
                attempts: 0,
                reason: "cache shut down".to_string(),
            });
        }

        let rx = {
            let mut tables = self.inner.tables.lock();
            if let Some(path) = tables.ready.get(&asset.cache_key) {
                self.inner.stats.record_memory_hit();
                debug!("{} {} memory hit", K::NAME, asset.cache_key);
                return Ok(path.clone());
            }

            match tables.in_flight.get(&asset.cache_key) {
                Some(rx) => {
                    self.inner.stats.record_coalesced();
                    debug!("{} {} joined in-flight load", K::NAME, asset.cache_key);
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(Transfer::Progress(0.0));
                    tables.in_flight.insert(asset.cache_key.clone(), rx.clone());
                    tables.failed.remove(&asset.cache_key);

                    let inner = Arc::clone(&self.inner);
                    let asset = asset.clone();
                    tokio::spawn(async move {
                        inner.load(K::NAME, asset, tx).await;
                    });
                    rx
                }
            }
        };

        wait_for_transfer(&asset.cache_key, rx, progress).await
    }

    /// Path of `cache_key` if it is already resolved in memory.
    pub fn cached_path(&self, cache_key: &str) -> Option<PathBuf> {
        self.inner.tables.lock().ready.get(cache_key).cloned()
    }

    pub fn entry_state(&self, cache_key: &str) -> EntryState {
        let tables = self.inner.tables.lock();
        if tables.ready.contains_key(cache_key) {
            EntryState::Ready
        } else if tables.in_flight.contains_key(cache_key) {
            EntryState::Downloading
        } else if tables.failed.contains(cache_key) {
            EntryState::Failed
        } else {
            EntryState::Absent
        }
    }

    /// Drop the in-memory handle for `cache_key`. The file stays on disk.
    pub fn release(&self, cache_key: &str) -> bool {
        let released = self.inner.tables.lock().ready.remove(cache_key).is_some();
        if released {
            debug!("{} {} released", K::NAME, cache_key);
        }
        released
    }

    /// Delete files last modified more than `max_age` ago. Returns the number removed.
    pub async fn cleanup(&self, max_age: Duration) -> Result<usize, CacheError> {
        let mut entries = match fs::read_dir(&self.inner.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0usize;

        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = name.strip_suffix(PARTIAL_FILE_SUFFIX).unwrap_or(&name);

            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }

            {
                let mut tables = self.inner.tables.lock();
                if tables.in_flight.contains_key(key) {
                    continue;
                }
                if key.len() == name.len() {
                    tables.ready.remove(key);
                }
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => {
                    removed += 1;
                    debug!("{} {} removed by cleanup (age {:?})", K::NAME, name, age);
                }
                Err(e) => warn!("{} cleanup could not remove {}: {}", K::NAME, name, e),
            }
        }

        if removed > 0 {
            info!("{} cleanup removed {} files", K::NAME, removed);
        }
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Abandon pending retries and refuse further downloads.
    pub fn shutdown(&self) {
        self.inner.downloader.shutdown();
    }
}

impl CacheInner {
    async fn load(&self, kind: &str, asset: MediaAsset, tx: watch::Sender<Transfer>) {
        let mut slot = LoadSlot {
            tables: &self.tables,
            kind,
            key: &asset.cache_key,
            tx,
            finished: false,
        };
        let result = self.fetch(kind, &asset, &slot.tx).await;
        slot.finish(result);
    }

    async fn fetch(
        &self,
        kind: &str,
        asset: &MediaAsset,
        tx: &watch::Sender<Transfer>,
    ) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.dir).await?;
        let target = self.dir.join(&asset.cache_key);

        match fs::metadata(&target).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                self.stats.record_disk_hit();
                debug!("{} {} disk hit", kind, asset.cache_key);
                return Ok(target);
            }
            Ok(meta) if meta.is_file() => {
                self.stats.record_corrupted();
                warn!("{} {} is empty on disk, re-downloading", kind, asset.cache_key);
                fs::remove_file(&target).await?;
            }
            Ok(_) => {
                return Err(CacheError::Io(format!(
                    "{} exists and is not a file",
                    target.display()
                )));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if !self.connectivity.is_connected().await {
            return Err(CacheError::NoConnectivity);
        }

        self.stats.record_download_started();
        info!("{} {} downloading from {}", kind, asset.cache_key, asset.remote_url);
        self.downloader
            .fetch_with_retry(&asset.cache_key, &asset.remote_url, &target, |p| {
                tx.send_replace(Transfer::Progress(p));
            })
            .await?;

        Ok(target)
    }
}

/// Owns a key's in-flight entry for the lifetime of one load task.
///
/// Dropped unfinished (panicking source, runtime shutdown), it still clears
/// the entry and publishes a failure so the next resolve starts over.
struct LoadSlot<'a> {
    tables: &'a Mutex<Tables>,
    kind: &'a str,
    key: &'a str,
    tx: watch::Sender<Transfer>,
    finished: bool,
}

impl LoadSlot<'_> {
    fn finish(&mut self, result: Result<PathBuf, CacheError>) {
        self.finished = true;
        {
            let mut tables = self.tables.lock();
            tables.in_flight.remove(self.key);
            match &result {
                Ok(path) => {
                    tables.ready.insert(self.key.to_string(), path.clone());
                }
                Err(e) => {
                    tables.failed.insert(self.key.to_string());
                    warn!("{} {} unavailable: {}", self.kind, self.key, e);
                }
            }
        }
        self.tx.send_replace(Transfer::Done(result));
    }
}

impl Drop for LoadSlot<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Err(CacheError::DownloadFailed {
                key: self.key.to_string(),
                attempts: 0,
                reason: "download task ended unexpectedly".to_string(),
            }));
        }
    }
}

async fn wait_for_transfer(
    key: &str,
    mut rx: watch::Receiver<Transfer>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, CacheError> {
    loop {
        let state = rx.borrow_and_update().clone();
        match state {
            Transfer::Done(result) => {
                if let (Ok(_), Some(cb)) = (&result, &progress) {
                    cb(1.0);
                }
                return result;
            }
            Transfer::Progress(p) => {
                if let Some(cb) = &progress {
                    cb(p);
                }
            }
        }

        if rx.changed().await.is_err() {
            let last = rx.borrow().clone();
            return match last {
                Transfer::Done(result) => result,
                Transfer::Progress(_) => Err(CacheError::DownloadFailed {
                    key: key.to_string(),
                    attempts: 0,
                    reason: "download task ended unexpectedly".to_string(),
                }),
            };
        }
    }
}
