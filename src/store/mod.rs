// Local key-value persistence: settings and completion flags.

pub mod records;

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{BREATHING_SETTINGS_KEY, COMPLETION_FLAG_PREFIX};
use crate::engine::session::BreathingSettings;

/// Async string-keyed, string-valued storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Store backed by a single JSON object file, rewritten atomically on change.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<BTreeMap<String, String>> {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => Ok(map),
                Err(e) => {
                    warn!("store {} unreadable, starting empty: {}", self.path.display(), e);
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    async fn write_file(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &payload)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        if entries.is_none() {
            *entries = Some(self.read_file().await?);
        }
        Ok(entries.as_ref().and_then(|m| m.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let mut map = match entries.take() {
            Some(map) => map,
            None => self.read_file().await?,
        };
        map.insert(key.to_string(), value.to_string());
        // On a failed write the cache stays empty and the next read reloads the file.
        self.write_file(&map).await?;
        *entries = Some(map);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let mut map = match entries.take() {
            Some(map) => map,
            None => self.read_file().await?,
        };
        if map.remove(key).is_some() {
            self.write_file(&map).await?;
        }
        *entries = Some(map);
        Ok(())
    }
}

/// In-process store, useful for tests and previews.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Read the stored breathing settings, falling back to defaults when absent or invalid.
pub async fn load_settings(store: &dyn KeyValueStore) -> Result<BreathingSettings> {
    let Some(raw) = store.get(BREATHING_SETTINGS_KEY).await? else {
        debug!("no stored breathing settings, using defaults");
        return Ok(BreathingSettings::default());
    };

    match serde_json::from_str::<BreathingSettings>(&raw) {
        Ok(settings) if settings.validate().is_ok() => Ok(settings),
        Ok(settings) => {
            warn!("stored breathing settings out of range {:?}, using defaults", settings);
            Ok(BreathingSettings::default())
        }
        Err(e) => {
            warn!("stored breathing settings unparsable: {}", e);
            Ok(BreathingSettings::default())
        }
    }
}

pub async fn save_settings(store: &dyn KeyValueStore, settings: &BreathingSettings) -> Result<()> {
    settings.validate()?;
    let raw = serde_json::to_string(settings)?;
    store.set(BREATHING_SETTINGS_KEY, &raw).await
}

/// Flag an exercise as completed on this device.
pub async fn mark_completed(store: &dyn KeyValueStore, exercise: &str) -> Result<()> {
    store
        .set(&format!("{}{}", COMPLETION_FLAG_PREFIX, exercise), "true")
        .await
}

pub async fn is_completed(store: &dyn KeyValueStore, exercise: &str) -> Result<bool> {
    let flag = store
        .get(&format!("{}{}", COMPLETION_FLAG_PREFIX, exercise))
        .await?;
    Ok(flag.as_deref() == Some("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settings_default_when_missing() {
        let store = MemoryStore::new();
        assert_eq!(load_settings(&store).await.unwrap(), BreathingSettings::default());
    }

    #[tokio::test]
    async fn test_settings_roundtrip_and_fallback() {
        let store = MemoryStore::new();
        let settings = BreathingSettings {
            inhale_seconds: 4,
            hold_seconds: 7,
            exhale_seconds: 8,
            cycles: 3,
        };
        save_settings(&store, &settings).await.unwrap();
        assert_eq!(load_settings(&store).await.unwrap(), settings);

        store.set(BREATHING_SETTINGS_KEY, "{not json").await.unwrap();
        assert_eq!(load_settings(&store).await.unwrap(), BreathingSettings::default());

        store
            .set(
                BREATHING_SETTINGS_KEY,
                r#"{"inhaleSeconds":0,"holdSeconds":1,"exhaleSeconds":1,"cycles":1}"#,
            )
            .await
            .unwrap();
        assert_eq!(load_settings(&store).await.unwrap(), BreathingSettings::default());
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_settings() {
        let store = MemoryStore::new();
        let bad = BreathingSettings {
            cycles: 0,
            ..BreathingSettings::default()
        };
        assert!(save_settings(&store, &bad).await.is_err());
        assert_eq!(store.get(BREATHING_SETTINGS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs").join("store.json");

        let store = FileStore::new(&path);
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.remove("a").await.unwrap();
        mark_completed(&store, "box-breathing").await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("a").await.unwrap(), None);
        assert_eq!(reopened.get("b").await.unwrap().as_deref(), Some("2"));
        assert!(is_completed(&reopened, "box-breathing").await.unwrap());
        assert!(!is_completed(&reopened, "gratitude").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_recovers_from_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"\x00garbage").unwrap();

        let store = FileStore::new(&path);
        assert_eq!(store.get("x").await.unwrap(), None);
        store.set("x", "y").await.unwrap();
        assert_eq!(FileStore::new(&path).get("x").await.unwrap().as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_last_saved_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let store = FileStore::new(&path);
        store.set("theme", "light").await.unwrap();

        // A directory squatting on the temp file name makes every write fail.
        std::fs::create_dir(dir.path().join("prefs.json.tmp")).unwrap();
        assert!(store.set("theme", "dark").await.is_err());
        assert_eq!(store.get("theme").await.unwrap().as_deref(), Some("light"));

        assert!(store.remove("theme").await.is_err());
        assert_eq!(store.get("theme").await.unwrap().as_deref(), Some("light"));
    }
}
