use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use tracing::info;

use crate::config::{CacheConfig, DEFAULT_CACHE_MAX_AGE_SECS};
use crate::engine::cache::{Audio, MediaAsset, ResourceCache, Video};
use crate::engine::session::BreathingSettings;
use crate::source::connectivity::TcpProbe;
use crate::source::http_source::HttpSource;
use crate::source::traits::{Connectivity, MediaSource};
use crate::store::{self, FileStore, KeyValueStore};

/// Which cache a media call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Video,
}

/// Cache counters for one media type.
#[derive(Debug, Clone)]
pub struct MediaStats {
    pub downloads: u64,
    pub hits: u64,
    pub failures: u64,
    pub downloaded_bytes: u64,
}

/// Process-wide services behind the FFI functions.
pub struct MediaEngine {
    audio: ResourceCache<Audio>,
    video: ResourceCache<Video>,
    preferences: Arc<dyn KeyValueStore>,
}

impl MediaEngine {
    pub fn new(
        config: &CacheConfig,
        source: Arc<dyn MediaSource>,
        connectivity: Arc<dyn Connectivity>,
        preferences: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            audio: ResourceCache::new(config, Arc::clone(&source), Arc::clone(&connectivity)),
            video: ResourceCache::new(config, source, connectivity),
            preferences,
        }
    }

    pub fn audio(&self) -> &ResourceCache<Audio> {
        &self.audio
    }

    pub fn video(&self) -> &ResourceCache<Video> {
        &self.video
    }

    pub async fn resolve(&self, media_type: MediaType, asset: &MediaAsset) -> Result<PathBuf> {
        let path = match media_type {
            MediaType::Audio => self.audio.resolve(asset, None).await?,
            MediaType::Video => self.video.resolve(asset, None).await?,
        };
        Ok(path)
    }

    pub fn release(&self, media_type: MediaType, cache_key: &str) -> bool {
        match media_type {
            MediaType::Audio => self.audio.release(cache_key),
            MediaType::Video => self.video.release(cache_key),
        }
    }

    pub async fn cleanup(&self, max_age: Duration) -> Result<usize> {
        let audio = self.audio.cleanup(max_age).await?;
        let video = self.video.cleanup(max_age).await?;
        Ok(audio + video)
    }

    pub fn stats(&self, media_type: MediaType) -> MediaStats {
        let snap = match media_type {
            MediaType::Audio => self.audio.stats(),
            MediaType::Video => self.video.stats(),
        };
        MediaStats {
            downloads: snap.downloads,
            hits: snap.memory_hits + snap.disk_hits,
            failures: snap.failures,
            downloaded_bytes: snap.downloaded_bytes,
        }
    }

    pub fn preferences(&self) -> &dyn KeyValueStore {
        self.preferences.as_ref()
    }

    pub fn shutdown(&self) {
        self.audio.shutdown();
        self.video.shutdown();
    }
}

static ENGINE: RwLock<Option<Arc<MediaEngine>>> = parking_lot::const_rwlock(None);

fn engine() -> Result<Arc<MediaEngine>> {
    ENGINE
        .read()
        .clone()
        .ok_or_else(|| anyhow!("media engine not initialized"))
}

/// Install an engine built by the host (tests, custom transports).
pub fn install_engine(engine: MediaEngine) {
    if let Some(previous) = ENGINE.write().replace(Arc::new(engine)) {
        previous.shutdown();
    }
}

/// Initialize the media engine with the given cache directory.
pub fn init_media(cache_dir: String) {
    let config = CacheConfig::new(&cache_dir);
    let preferences = FileStore::new(PathBuf::from(&cache_dir).join("preferences.json"));
    install_engine(MediaEngine::new(
        &config,
        Arc::new(HttpSource::default()),
        Arc::new(TcpProbe::default()),
        Arc::new(preferences),
    ));
    info!("media engine initialized at {}", cache_dir);
}

/// Resolve a remote media file to a local path, downloading it if needed.
pub async fn resolve_media(media_type: MediaType, url: String, cache_key: String) -> Result<String> {
    let asset = MediaAsset::new(url, cache_key);
    let path = engine()?.resolve(media_type, &asset).await?;
    Ok(path.to_string_lossy().into_owned())
}

/// Drop the in-memory handle of a cached file.
pub fn release_media(media_type: MediaType, cache_key: String) -> Result<bool> {
    Ok(engine()?.release(media_type, &cache_key))
}

/// Remove cached files older than `max_age_secs` (default 7 days).
pub async fn cleanup_media(max_age_secs: Option<u64>) -> Result<u32> {
    let max_age = Duration::from_secs(max_age_secs.unwrap_or(DEFAULT_CACHE_MAX_AGE_SECS));
    let removed = engine()?.cleanup(max_age).await?;
    Ok(removed as u32)
}

/// Return cache counters for one media type.
pub fn media_stats(media_type: MediaType) -> Result<MediaStats> {
    Ok(engine()?.stats(media_type))
}

pub async fn load_breathing_settings() -> Result<BreathingSettings> {
    let engine = engine()?;
    store::load_settings(engine.preferences()).await
}

pub async fn save_breathing_settings(settings: BreathingSettings) -> Result<()> {
    let engine = engine()?;
    store::save_settings(engine.preferences(), &settings).await
}

/// Shut down the media engine and release all resources.
pub fn dispose() {
    if let Some(engine) = ENGINE.write().take() {
        engine.shutdown();
        info!("media engine disposed");
    }
}
