use std::collections::HashMap;

use tracing::{debug, warn};

use super::cache::{Audio, MediaAsset, MediaKind, ResourceCache, Video};
use super::driver::PhaseCues;
use super::session::BreathingPhase;

/// Audio and visual assets shown during one phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseMedia {
    pub audio: Option<MediaAsset>,
    pub video: Option<MediaAsset>,
}

/// Requests phase media from the caches whenever a phase starts.
///
/// Resolution runs in the background so the countdown never waits on the network.
pub struct MediaCues {
    audio: ResourceCache<Audio>,
    video: ResourceCache<Video>,
    media: HashMap<BreathingPhase, PhaseMedia>,
}

impl MediaCues {
    pub fn new(audio: ResourceCache<Audio>, video: ResourceCache<Video>) -> Self {
        Self {
            audio,
            video,
            media: HashMap::new(),
        }
    }

    pub fn with_phase(mut self, phase: BreathingPhase, media: PhaseMedia) -> Self {
        self.media.insert(phase, media);
        self
    }

    /// Warm every configured asset ahead of the session.
    pub fn prefetch_all(&self) {
        for media in self.media.values() {
            self.request(media);
        }
    }

    fn request(&self, media: &PhaseMedia) {
        if let Some(asset) = &media.audio {
            spawn_resolve(&self.audio, asset);
        }
        if let Some(asset) = &media.video {
            spawn_resolve(&self.video, asset);
        }
    }
}

impl PhaseCues for MediaCues {
    fn phase_started(&self, cycle: u32, phase: BreathingPhase) {
        if let Some(media) = self.media.get(&phase) {
            debug!("cycle {} {} requesting media", cycle, phase.label());
            self.request(media);
        }
    }
}

fn spawn_resolve<K: MediaKind>(cache: &ResourceCache<K>, asset: &MediaAsset) {
    if cache.cached_path(&asset.cache_key).is_some() {
        return;
    }
    let cache = cache.clone();
    let asset = asset.clone();
    tokio::spawn(async move {
        if let Err(e) = cache.resolve(&asset, None).await {
            warn!("{} {} prefetch failed: {}", K::NAME, asset.cache_key, e);
        }
    });
}
